use crate::config::Config;
use reqwest::{header, Client, Response, StatusCode};
use serveroute_core::{CommandReply, CommandRequest, ControlCommand, ServiceListing};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const LIST_PATH: &str = "/list";
const EVENTS_PATH: &str = "/events";
const LAST_EVENT_ID: &str = "Last-Event-ID";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{endpoint} returned {status}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
    },
    #[error("control api rejected command: {0}")]
    Rejected(String),
}

/// HTTP client for the control API.
#[derive(Clone, Debug)]
pub struct ControlApi {
    client: Client,
    base: Url,
    request_timeout: Duration,
}

impl ControlApi {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base: config.api_base.clone(),
            request_timeout: config.request_timeout,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    pub async fn fetch_listing(&self) -> Result<ServiceListing, ApiError> {
        let url = self.endpoint(LIST_PATH)?;
        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = expect_success(LIST_PATH, response)?;
        Ok(response.json::<ServiceListing>().await?)
    }

    /// Sends a command and reports whether the API accepted it. The reply is
    /// never used to update local state.
    pub async fn send_command(&self, command: ControlCommand, service: &str) -> Result<(), ApiError> {
        let url = self.endpoint(command.path())?;
        let response = self
            .client
            .post(url)
            .json(&CommandRequest {
                service: service.to_string(),
            })
            .send()
            .await?;
        let response = expect_success(command.path(), response)?;
        match response.json::<CommandReply>().await {
            Ok(reply) if reply.is_error() => Err(ApiError::Rejected(
                reply.error.unwrap_or_else(|| "unspecified error".to_string()),
            )),
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(event = "command_reply_unparsed", command = %command, error = %err);
                Ok(())
            }
        }
    }

    /// Opens the server-sent event stream. No read timeout is applied.
    pub async fn open_events(&self, last_event_id: Option<&str>) -> Result<Response, ApiError> {
        let url = self.endpoint(EVENTS_PATH)?;
        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            request = request.header(LAST_EVENT_ID, id);
        }
        let response = request.send().await?;
        expect_success(EVENTS_PATH, response)
    }
}

fn expect_success(endpoint: &'static str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status { endpoint, status })
    }
}
