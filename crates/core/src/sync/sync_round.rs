//! Contract between the attempt coordinator and the sync engine.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use super::SyncCycleTrigger;
use crate::errors::{Error, Result};
use crate::platform::{exec, DbWorkerLock, Fetch, FetchError, FetchResponse};

/// Capabilities available to a sync round while it holds the sync lock.
#[derive(Clone)]
pub struct SyncRoundContext {
    pub trigger: SyncCycleTrigger,
    pub sync_url: String,
    worker: Arc<dyn DbWorkerLock>,
    fetch: Arc<dyn Fetch>,
}

impl SyncRoundContext {
    pub fn new(
        trigger: SyncCycleTrigger,
        sync_url: impl Into<String>,
        worker: Arc<dyn DbWorkerLock>,
        fetch: Arc<dyn Fetch>,
    ) -> Self {
        Self {
            trigger,
            sync_url: sync_url.into(),
            worker,
            fetch,
        }
    }

    /// Run storage work through the worker lock.
    pub async fn with_worker<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        exec(self.worker.as_ref(), work)
            .await
            .unwrap_or_else(|| Err(Error::sync("Storage worker shut down")))
    }

    /// Post one payload to the sync endpoint.
    pub async fn post(&self, body: Vec<u8>) -> std::result::Result<FetchResponse, FetchError> {
        self.fetch.fetch(&self.sync_url, body).await
    }

    pub fn worker(&self) -> Arc<dyn DbWorkerLock> {
        Arc::clone(&self.worker)
    }

    pub fn fetch(&self) -> Arc<dyn Fetch> {
        Arc::clone(&self.fetch)
    }
}

impl std::fmt::Debug for SyncRoundContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRoundContext")
            .field("trigger", &self.trigger)
            .field("sync_url", &self.sync_url)
            .finish_non_exhaustive()
    }
}

/// One round of exchanging local and remote changes, supplied by the sync
/// engine. Runs only while the sync lock is held.
#[async_trait]
pub trait SyncRound: Send + Sync {
    async fn run(&self, ctx: &SyncRoundContext) -> Result<()>;
}
