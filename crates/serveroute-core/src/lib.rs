pub mod events;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Snapshot body returned by the control API's `/list` endpoint.
pub type ServiceListing = BTreeMap<String, ServiceEntry>;

/// Last reported status of a service.
///
/// The set is open: anything the server reports besides `started` and
/// `stopped` is kept verbatim in `Other` instead of being coerced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceStatus {
    Started,
    Stopped,
    Other(String),
}

impl ServiceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceStatus::Started => "started",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Other(raw) => raw.as_str(),
        }
    }

    /// Whether issuing `command` against a service in this status would be a no-op.
    pub fn satisfies(&self, command: ControlCommand) -> bool {
        *self == command.target_status()
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ServiceStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "started" => ServiceStatus::Started,
            "stopped" => ServiceStatus::Stopped,
            _ => ServiceStatus::Other(raw),
        }
    }
}

impl From<ServiceStatus> for String {
    fn from(status: ServiceStatus) -> Self {
        match status {
            ServiceStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = std::convert::Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(ServiceStatus::from(input.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
}

impl ServiceEntry {
    pub fn new(status: ServiceStatus) -> Self {
        Self {
            status,
            subdomain: None,
        }
    }
}

/// Fire-and-forget command accepted by the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    Start,
    Stop,
}

impl ControlCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            ControlCommand::Start => "/start",
            ControlCommand::Stop => "/stop",
        }
    }

    pub fn target_status(self) -> ServiceStatus {
        match self {
            ControlCommand::Start => ServiceStatus::Started,
            ControlCommand::Stop => ServiceStatus::Stopped,
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub service: String,
}

/// Reply body of `/start` and `/stop`. Only ever logged, never applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CommandReply {
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error") || self.error.is_some()
    }
}
