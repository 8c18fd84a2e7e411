//! Network transport capability for posting opaque sync payloads.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

/// Content type sent with every sync payload.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// The sync endpoint could not be reached.
///
/// Covers DNS failures, refused connections, timeouts, TLS failures and
/// interrupted bodies alike. A response with a non-2xx status is not a
/// `FetchError`; it arrives as a [`FetchResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("Network error: the sync server could not be reached")]
pub struct FetchError;

/// Response returned by a completed round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// One-shot POST of an opaque binary payload.
///
/// Implementations perform exactly one round-trip per call and never retry.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, body: Vec<u8>) -> Result<FetchResponse, FetchError>;
}

/// A request observed by [`MockFetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub body: Vec<u8>,
}

/// Scripted transport for tests and offline builds.
///
/// Replies are consumed in order; once the script is exhausted every call
/// fails with [`FetchError`].
#[derive(Debug, Default)]
pub struct MockFetch {
    replies: Mutex<VecDeque<Result<FetchResponse, FetchError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next unanswered call.
    pub fn push_reply(&self, reply: Result<FetchResponse, FetchError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Fetch for MockFetch {
    async fn fetch(&self, url: &str, body: Vec<u8>) -> Result<FetchResponse, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                url: url.to_string(),
                body,
            });
        }
        self.replies
            .lock()
            .map_err(|_| FetchError)?
            .pop_front()
            .unwrap_or(Err(FetchError))
    }
}
