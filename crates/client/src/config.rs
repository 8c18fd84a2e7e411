//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use localsync_core::platform::DEFAULT_LIFECYCLE_DEBOUNCE;
use localsync_core::{Error, Result};
use localsync_transport::HttpFetchConfig;

const SYNC_URL_ENV: &str = "LOCALSYNC_SYNC_URL";
const LOCK_FILE_ENV: &str = "LOCALSYNC_LOCK_FILE";
const DEBOUNCE_ENV: &str = "LOCALSYNC_LIFECYCLE_DEBOUNCE_MS";
const LIFECYCLE_ENV: &str = "LOCALSYNC_LIFECYCLE_EVENTS";

/// Settings the composition root needs to assemble the platform services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Endpoint every sync payload is posted to.
    pub sync_url: String,
    pub fetch: HttpFetchConfig,
    /// When set, sync attempts are exclusive across processes through this
    /// file instead of within the process only.
    pub lock_file: Option<PathBuf>,
    pub lifecycle_debounce: Duration,
    /// Whether the platform reports lifecycle events. `None` follows the DOM
    /// capability probe.
    pub lifecycle_events: Option<bool>,
}

impl ClientConfig {
    pub fn new(sync_url: impl Into<String>) -> Self {
        Self {
            sync_url: normalize_url(&sync_url.into()),
            fetch: HttpFetchConfig::default(),
            lock_file: None,
            lifecycle_debounce: DEFAULT_LIFECYCLE_DEBOUNCE,
            lifecycle_events: None,
        }
    }

    pub fn with_fetch(mut self, fetch: HttpFetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    pub fn with_lifecycle_debounce(mut self, debounce: Duration) -> Self {
        self.lifecycle_debounce = debounce;
        self
    }

    pub fn with_lifecycle_events(mut self, enabled: bool) -> Self {
        self.lifecycle_events = Some(enabled);
        self
    }

    /// Read the configuration from `LOCALSYNC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let fetch = HttpFetchConfig::from_env().map_err(|e| Error::config(e.to_string()))?;
        Self::from_lookup(|name| std::env::var(name).ok()).map(|config| config.with_fetch(fetch))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let sync_url = get(SYNC_URL_ENV).ok_or_else(|| {
            Error::config(format!(
                "{} not configured. Sync is disabled.",
                SYNC_URL_ENV
            ))
        })?;
        let mut config = Self::new(sync_url);

        if let Some(path) = get(LOCK_FILE_ENV) {
            config.lock_file = Some(PathBuf::from(path));
        }
        if let Some(raw) = get(DEBOUNCE_ENV) {
            let millis = raw.parse::<u64>().map_err(|_| {
                Error::config(format!("{} must be milliseconds", DEBOUNCE_ENV))
            })?;
            config.lifecycle_debounce = Duration::from_millis(millis);
        }
        if let Some(raw) = get(LIFECYCLE_ENV) {
            config.lifecycle_events = Some(parse_flag(LIFECYCLE_ENV, &raw)?);
        }

        Ok(config)
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("{} must be true or false", name))),
    }
}
