//! HTTP transport configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TransportError};

const TIMEOUT_ENV: &str = "LOCALSYNC_FETCH_TIMEOUT_SECS";
const CONNECT_TIMEOUT_ENV: &str = "LOCALSYNC_FETCH_CONNECT_TIMEOUT_SECS";

/// Settings for [`crate::HttpFetch`].
///
/// Both timeouts default to none. When set, hitting one counts as a network
/// failure of that single attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpFetchConfig {
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl HttpFetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the whole-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Read timeouts (whole seconds) from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            timeout: secs_from_env(TIMEOUT_ENV)?,
            connect_timeout: secs_from_env(CONNECT_TIMEOUT_ENV)?,
        })
    }
}

fn secs_from_env(name: &str) -> Result<Option<Duration>> {
    let Some(raw) = std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    else {
        return Ok(None);
    };
    parse_secs(name, &raw).map(Some)
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| TransportError::invalid_config(format!("{} must be whole seconds", name)))
}
