//! HTTP implementation of the `Fetch` capability.
//!
//! Posts opaque protobuf payloads to the sync endpoint. One call is one
//! round-trip; retry policy belongs to whoever drives the sync attempt.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use std::collections::BTreeMap;

use localsync_core::platform::{Fetch, FetchError, FetchResponse, PROTOBUF_CONTENT_TYPE};

use crate::config::HttpFetchConfig;
use crate::error::Result;

const MAX_LOG_BODY_BYTES: usize = 512;

/// `Fetch` backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    /// Create a transport with the given timeouts.
    pub fn new(config: &HttpFetchConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an existing client (shared connection pool, custom TLS, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn headers(body_len: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROTOBUF_CONTENT_TYPE));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
        headers
    }

    fn log_response(url: &str, status: reqwest::StatusCode, body: &[u8]) {
        if status.is_success() {
            debug!("[Fetch] {} -> {} ({} bytes)", url, status, body.len());
            return;
        }

        let cut = body.len().min(MAX_LOG_BODY_BYTES);
        let mut preview = String::from_utf8_lossy(&body[..cut]).to_string();
        if body.len() > MAX_LOG_BODY_BYTES {
            preview.push_str("...");
        }
        debug!("[Fetch] {} -> {}: {}", url, status, preview);
    }

    fn collapse(url: &str, err: reqwest::Error) -> FetchError {
        debug!(
            "[Fetch] POST {} failed (timeout={}, connect={}): {}",
            url,
            err.is_timeout(),
            err.is_connect(),
            err
        );
        FetchError
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(
        &self,
        url: &str,
        body: Vec<u8>,
    ) -> std::result::Result<FetchResponse, FetchError> {
        let response = self
            .client
            .post(url)
            .headers(Self::headers(body.len()))
            .body(body)
            .send()
            .await
            .map_err(|err| Self::collapse(url, err))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect::<BTreeMap<_, _>>();
        let body = response
            .bytes()
            .await
            .map_err(|err| Self::collapse(url, err))?
            .to_vec();
        Self::log_response(url, status, &body);

        Ok(FetchResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
