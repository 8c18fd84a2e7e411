//! Composition root: the platform services one client runs with.

use log::info;
use std::sync::Arc;

use localsync_core::platform::{
    can_use_dom, AppState, DbWorkerLock, Fetch, FifoDbWorkerLock, FileSyncLock, FlushSync,
    ImmediateFlushSync, InProcessSyncLock, LifecycleAppState, NoopAppState, SyncLock,
    SyncStateReset,
};
use localsync_core::{Error, Result};
use localsync_transport::HttpFetch;

use crate::config::ClientConfig;

pub struct PlatformContext {
    pub sync_url: String,
    /// DOM capability, probed once per process.
    pub can_use_dom: bool,

    pub sync_lock: Arc<dyn SyncLock>,
    pub db_worker_lock: Arc<dyn DbWorkerLock>,
    pub fetch: Arc<dyn Fetch>,
    pub app_state: Arc<dyn AppState>,
    pub flush_sync: Arc<dyn FlushSync>,
}

impl PlatformContext {
    /// Assemble the default service set for `config`.
    ///
    /// Spawns the storage worker task, so it must run inside a tokio runtime.
    /// `reset` is the client's hook for clearing cached sync state.
    pub fn from_config(config: &ClientConfig, reset: Arc<dyn SyncStateReset>) -> Result<Self> {
        let can_use_dom = can_use_dom();

        let sync_lock: Arc<dyn SyncLock> = match &config.lock_file {
            Some(path) => {
                info!("[Platform] Sync lock shared through {}", path.display());
                Arc::new(FileSyncLock::new(path))
            }
            None => Arc::new(InProcessSyncLock::new()),
        };

        let fetch = HttpFetch::new(&config.fetch).map_err(|e| Error::config(e.to_string()))?;

        let lifecycle = config.lifecycle_events.unwrap_or(can_use_dom);
        let app_state: Arc<dyn AppState> = if lifecycle {
            Arc::new(LifecycleAppState::new(reset).with_debounce(config.lifecycle_debounce))
        } else {
            Arc::new(NoopAppState::new(reset))
        };

        Ok(Self {
            sync_url: config.sync_url.clone(),
            can_use_dom,
            sync_lock,
            db_worker_lock: Arc::new(FifoDbWorkerLock::spawn()),
            fetch: Arc::new(fetch),
            app_state,
            flush_sync: Arc::new(ImmediateFlushSync),
        })
    }

    pub fn sync_lock(&self) -> Arc<dyn SyncLock> {
        Arc::clone(&self.sync_lock)
    }

    pub fn db_worker_lock(&self) -> Arc<dyn DbWorkerLock> {
        Arc::clone(&self.db_worker_lock)
    }

    pub fn fetch(&self) -> Arc<dyn Fetch> {
        Arc::clone(&self.fetch)
    }

    pub fn app_state(&self) -> Arc<dyn AppState> {
        Arc::clone(&self.app_state)
    }

    pub fn flush_sync(&self) -> Arc<dyn FlushSync> {
        Arc::clone(&self.flush_sync)
    }
}
