//! Relay configuration

use crate::error::{Error, Result};
use crate::types::ForwardMode;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Upstream the dashboard queries when nothing else is configured
pub const DEFAULT_UPSTREAM_URL: &str = "https://obras-ng.ciga.sc.gov.br/api";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Runtime configuration for the relay server
#[derive(Clone, Debug, PartialEq)]
pub struct RelayConfig {
    /// Fixed upstream address every query is forwarded to
    pub upstream_url: String,

    /// Address the HTTP server binds to
    pub listen_addr: String,

    /// Outbound payload construction
    pub forward_mode: ForwardMode,

    /// Timeout for the single outbound call
    pub timeout: Duration,

    /// Largest inbound body accepted
    pub max_body_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            forward_mode: ForwardMode::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl RelayConfig {
    /// Create configuration from `RELAY_*` environment variables with validation
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            upstream_url: lookup("RELAY_UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            listen_addr: lookup("RELAY_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            forward_mode: parse_var(&lookup, "RELAY_FORWARD_MODE")?
                .unwrap_or(defaults.forward_mode),
            timeout: parse_var::<u64, _>(&lookup, "RELAY_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_body_bytes: parse_var(&lookup, "RELAY_MAX_BODY_BYTES")?
                .unwrap_or(defaults.max_body_bytes),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable before the server starts
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.upstream_url)
            .map_err(|e| Error::Config(format!("upstream url '{}': {e}", self.upstream_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "upstream url must be http or https, got '{}'",
                url.scheme()
            )));
        }

        self.socket_addr()?;

        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(Error::Config("max body size must be greater than zero".into()));
        }
        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| Error::Config(format!("listen address '{}': {e}", self.listen_addr)))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}={raw}: {e}"))),
    }
}
