//! Sync attempt coordinator: lock, round, release, and lifecycle wiring.

use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use uuid::Uuid;

use localsync_core::platform::{with_sync_lock, AppStateConfig, LifecycleEvent};
use localsync_core::sync::{
    SyncAttemptOutcome, SyncAttemptReport, SyncCycleTrigger, SyncRound, SyncRoundContext,
    SyncSkipReason,
};
use localsync_core::{Error, Result};

use crate::context::PlatformContext;

/// Runs sync attempts on behalf of every trigger source.
///
/// At most one attempt runs at a time; a trigger that arrives while another
/// attempt holds the sync lock is skipped, not queued.
pub struct SyncCoordinator {
    context: Arc<PlatformContext>,
    round: Arc<dyn SyncRound>,
    last_report: Mutex<Option<SyncAttemptReport>>,
}

impl SyncCoordinator {
    pub fn new(context: Arc<PlatformContext>, round: Arc<dyn SyncRound>) -> Arc<Self> {
        Arc::new(Self {
            context,
            round,
            last_report: Mutex::new(None),
        })
    }

    pub fn context(&self) -> Arc<PlatformContext> {
        Arc::clone(&self.context)
    }

    /// Report of the most recent attempt, skipped ones included.
    pub fn last_report(&self) -> Option<SyncAttemptReport> {
        self.last_report
            .lock()
            .ok()
            .and_then(|report| report.clone())
    }

    /// Run one sync attempt unless another one is in progress.
    pub async fn request_sync(&self, trigger: SyncCycleTrigger) -> SyncAttemptReport {
        let attempt_id = Uuid::new_v4().to_string();
        let started_at = Utc::now().to_rfc3339();
        let started = Instant::now();

        let ctx = SyncRoundContext::new(
            trigger,
            self.context.sync_url.clone(),
            self.context.db_worker_lock(),
            self.context.fetch(),
        );
        let sync_lock = self.context.sync_lock();

        let outcome = match with_sync_lock(sync_lock.as_ref(), self.round.run(&ctx)).await {
            None => {
                debug!(
                    "[Sync] Attempt {} ({:?}) skipped: another attempt holds the lock",
                    attempt_id, trigger
                );
                SyncAttemptOutcome::Skipped {
                    reason: SyncSkipReason::LockHeld,
                }
            }
            Some(Ok(())) => SyncAttemptOutcome::Completed,
            Some(Err(err)) => {
                warn!("[Sync] Attempt {} ({:?}) failed: {}", attempt_id, trigger, err);
                SyncAttemptOutcome::Failed {
                    message: err.to_string(),
                    network: err.is_network(),
                }
            }
        };

        let report = SyncAttemptReport {
            attempt_id,
            trigger,
            started_at,
            duration_ms: started.elapsed().as_millis() as i64,
            outcome,
        };
        if !report.outcome.is_skipped() {
            info!(
                "[Sync] Attempt {} trigger={:?} status={} duration_ms={}",
                report.attempt_id,
                report.trigger,
                report.outcome.status(),
                report.duration_ms
            );
        }

        if let Ok(mut last) = self.last_report.lock() {
            *last = Some(report.clone());
        }
        report
    }

    /// Register the lifecycle observer. Qualifying transitions spawn a
    /// `Foreground` attempt on the runtime this is called from.
    pub fn start_lifecycle(self: &Arc<Self>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::config("Lifecycle wiring requires a running tokio runtime"))?;
        let coordinator: Weak<Self> = Arc::downgrade(self);

        self.context.app_state.init(AppStateConfig::new(move || {
            let Some(coordinator) = coordinator.upgrade() else {
                debug!("[Sync] Lifecycle request after shutdown ignored");
                return;
            };
            runtime.spawn(async move {
                coordinator.request_sync(SyncCycleTrigger::Foreground).await;
            });
        }));
        Ok(())
    }

    /// Forward a platform lifecycle event to the app state.
    pub fn handle_lifecycle_event(&self, event: LifecycleEvent) -> bool {
        self.context.app_state.handle_event(event)
    }

    /// Clear the client's cached sync state through the app state binding.
    pub async fn reset(&self) -> Result<()> {
        self.context.app_state.reset().await?;
        if let Ok(mut last) = self.last_report.lock() {
            *last = None;
        }
        Ok(())
    }
}
