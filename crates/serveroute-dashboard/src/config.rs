use clap::Parser;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

pub const DEFAULT_ORIGIN: &str = "http://localhost";
const API_HOST_PREFIX: &str = "api.";

#[derive(Parser, Debug)]
#[command(name = "serveroute-dashboard", about = "Live start/stop dashboard for serveroute services")]
pub struct Args {
    /// Origin the dashboard is served for; the control API lives on its `api.` subdomain.
    #[arg(long, env = "SERVEROUTE_ORIGIN", default_value = DEFAULT_ORIGIN)]
    pub origin: String,
    /// Use this control API base instead of deriving it from the origin.
    #[arg(long, env = "SERVEROUTE_API_BASE")]
    pub api_base: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub snapshot_retries: u32,
    #[arg(long, default_value_t = 5)]
    pub connect_timeout_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub request_timeout_secs: u64,
    /// Delay before reopening the event stream, unless the server sends `retry:`.
    #[arg(long, default_value_t = 3000)]
    pub reconnect_ms: u64,
    #[arg(long, env = "SERVEROUTE_LOG_FILE")]
    pub log_file: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_base: Url,
    pub snapshot_retries: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
    pub log_file: Option<PathBuf>,
    pub debug: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid origin '{input}': {reason}")]
    InvalidOrigin { input: String, reason: String },
    #[error("invalid api base '{input}': {reason}")]
    InvalidApiBase { input: String, reason: String },
}

pub fn load_config() -> Result<Config, ConfigError> {
    Config::from_args(Args::parse())
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let api_base = match args.api_base.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => parse_api_base(raw)?,
            _ => derive_api_base(&args.origin)?,
        };
        Ok(Self {
            api_base,
            snapshot_retries: args.snapshot_retries,
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            reconnect_delay: Duration::from_millis(args.reconnect_ms),
            log_file: args.log_file,
            debug: args.debug || env_true("SERVEROUTE_DEBUG"),
        })
    }
}

/// `https://example.com:8443/ui` -> `https://api.example.com:8443/`
pub fn derive_api_base(origin: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidOrigin {
        input: origin.to_string(),
        reason,
    };
    let mut base = Url::parse(origin.trim()).map_err(|err| invalid(err.to_string()))?;
    let host = base
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?
        .to_string();
    base.set_host(Some(&format!("{API_HOST_PREFIX}{host}")))
        .map_err(|err| invalid(err.to_string()))?;
    base.set_path("/");
    base.set_query(None);
    base.set_fragment(None);
    Ok(base)
}

fn parse_api_base(raw: &str) -> Result<Url, ConfigError> {
    let mut base = Url::parse(raw).map_err(|err| ConfigError::InvalidApiBase {
        input: raw.to_string(),
        reason: err.to_string(),
    })?;
    if base.cannot_be_a_base() {
        return Err(ConfigError::InvalidApiBase {
            input: raw.to_string(),
            reason: "not a hierarchical url".to_string(),
        });
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.set_query(None);
    base.set_fragment(None);
    Ok(base)
}

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

#[cfg(test)]
pub(crate) fn test_config(api_base: &str) -> Config {
    Config {
        api_base: parse_api_base(api_base).expect("test api base"),
        snapshot_retries: 0,
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(50),
        log_file: None,
        debug: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(origin: &str, api_base: Option<&str>) -> Args {
        Args {
            origin: origin.to_string(),
            api_base: api_base.map(str::to_string),
            snapshot_retries: 2,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            reconnect_ms: 1500,
            log_file: None,
            debug: false,
        }
    }

    #[test]
    fn api_base_prefixes_host_and_keeps_scheme_and_port() {
        let base = derive_api_base("https://example.com:8443/dashboard?tab=1#top").expect("base");
        assert_eq!(base.as_str(), "https://api.example.com:8443/");

        let base = derive_api_base("http://localhost").expect("base");
        assert_eq!(base.as_str(), "http://api.localhost/");
    }

    #[test]
    fn origin_without_host_is_rejected() {
        assert!(matches!(
            derive_api_base("example.com"),
            Err(ConfigError::InvalidOrigin { .. })
        ));
        assert!(matches!(
            derive_api_base("mailto:ops@example.com"),
            Err(ConfigError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn explicit_api_base_overrides_origin() {
        let config = Config::from_args(args(
            "https://example.com",
            Some("http://127.0.0.1:9000/control"),
        ))
        .expect("config");
        assert_eq!(config.api_base.as_str(), "http://127.0.0.1:9000/control/");
        assert_eq!(config.snapshot_retries, 2);
        assert_eq!(config.reconnect_delay, Duration::from_millis(1500));

        let config = Config::from_args(args("https://example.com", Some("  "))).expect("config");
        assert_eq!(config.api_base.as_str(), "https://api.example.com/");
    }
}
