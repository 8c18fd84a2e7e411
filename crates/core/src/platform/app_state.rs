//! Application lifecycle observer.
//!
//! The platform glue forwards raw lifecycle events; an [`AppState`] decides
//! which of them are qualifying transitions and asks the client to sync.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::errors::Result;

/// Default window in which repeated qualifying transitions are coalesced.
/// Zero: every qualifying transition requests its own sync.
pub const DEFAULT_LIFECYCLE_DEBOUNCE: Duration = Duration::ZERO;

/// Callback asking the client to attempt a sync.
pub type RequestSync = Arc<dyn Fn() + Send + Sync>;

/// Configuration handed to [`AppState::init`].
#[derive(Clone)]
pub struct AppStateConfig {
    pub on_request_sync: RequestSync,
}

impl AppStateConfig {
    pub fn new(on_request_sync: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_request_sync: Arc::new(on_request_sync),
        }
    }
}

impl std::fmt::Debug for AppStateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStateConfig").finish_non_exhaustive()
    }
}

/// Raw lifecycle events reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Foreground,
    Background,
    Visible,
    Hidden,
    FocusGained,
    FocusLost,
}

impl LifecycleEvent {
    /// Phase the application is in after this event.
    pub fn phase(self) -> LifecyclePhase {
        match self {
            Self::Foreground | Self::Visible | Self::FocusGained => LifecyclePhase::Active,
            Self::Background | Self::Hidden | Self::FocusLost => LifecyclePhase::Inactive,
        }
    }
}

/// Coarse application phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Active,
    Inactive,
}

/// Decides which events are worth a sync attempt.
pub trait LifecyclePolicy: Send + Sync {
    fn is_qualifying(&self, previous: LifecyclePhase, event: LifecycleEvent) -> bool;
}

/// Qualifies every return from an inactive phase to an active one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumePolicy;

impl LifecyclePolicy for ResumePolicy {
    fn is_qualifying(&self, previous: LifecyclePhase, event: LifecycleEvent) -> bool {
        previous == LifecyclePhase::Inactive && event.phase() == LifecyclePhase::Active
    }
}

/// Hook through which the surrounding client clears its cached sync progress.
#[async_trait]
pub trait SyncStateReset: Send + Sync {
    async fn reset_sync_state(&self) -> Result<()>;
}

/// Reset hook for clients that cache nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSyncStateReset;

#[async_trait]
impl SyncStateReset for NoSyncStateReset {
    async fn reset_sync_state(&self) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle capability of the platform binding.
#[async_trait]
pub trait AppState: Send + Sync {
    /// Register the lifecycle observer. Only the first call takes effect.
    fn init(&self, config: AppStateConfig);

    /// Clear the client's notion of current sync state.
    async fn reset(&self) -> Result<()>;

    /// Forward a platform event. Returns `true` when a sync was requested.
    fn handle_event(&self, event: LifecycleEvent) -> bool {
        let _ = event;
        false
    }
}

/// App state for platforms without a foreground/background distinction.
pub struct NoopAppState {
    reset: Arc<dyn SyncStateReset>,
}

impl NoopAppState {
    pub fn new(reset: Arc<dyn SyncStateReset>) -> Self {
        Self { reset }
    }
}

impl Default for NoopAppState {
    fn default() -> Self {
        Self::new(Arc::new(NoSyncStateReset))
    }
}

#[async_trait]
impl AppState for NoopAppState {
    fn init(&self, _config: AppStateConfig) {
        debug!("[AppState] Platform has no lifecycle; sync requests come from elsewhere");
    }

    async fn reset(&self) -> Result<()> {
        self.reset.reset_sync_state().await
    }
}

#[derive(Debug)]
struct ObserverState {
    phase: LifecyclePhase,
    last_request: Option<Instant>,
}

/// App state driven by platform lifecycle events.
///
/// Repeated events that do not change the phase are ignored. With a non-zero
/// debounce, qualifying transitions arriving within that window of the
/// previous request are coalesced into it.
pub struct LifecycleAppState {
    config: OnceLock<AppStateConfig>,
    state: Mutex<ObserverState>,
    policy: Box<dyn LifecyclePolicy>,
    debounce: Duration,
    reset: Arc<dyn SyncStateReset>,
}

impl LifecycleAppState {
    pub fn new(reset: Arc<dyn SyncStateReset>) -> Self {
        Self {
            config: OnceLock::new(),
            state: Mutex::new(ObserverState {
                phase: LifecyclePhase::Active,
                last_request: None,
            }),
            policy: Box::new(ResumePolicy),
            debounce: DEFAULT_LIFECYCLE_DEBOUNCE,
            reset,
        }
    }

    pub fn with_policy(mut self, policy: impl LifecyclePolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_initial_phase(self, phase: LifecyclePhase) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.phase = phase;
        }
        self
    }

    pub fn phase(&self) -> Option<LifecyclePhase> {
        self.state.lock().ok().map(|state| state.phase)
    }

    pub fn is_initialized(&self) -> bool {
        self.config.get().is_some()
    }

    /// Record `event` and request a sync when it completes a qualifying
    /// transition.
    pub fn notify(&self, event: LifecycleEvent) -> bool {
        let Ok(mut state) = self.state.lock() else {
            warn!("[AppState] Observer state poisoned; dropping {:?}", event);
            return false;
        };

        let qualifying = self.policy.is_qualifying(state.phase, event);
        state.phase = event.phase();
        if !qualifying {
            return false;
        }

        let Some(config) = self.config.get() else {
            debug!("[AppState] {:?} before init; not requesting sync", event);
            return false;
        };

        let now = Instant::now();
        if let Some(last) = state.last_request {
            if now.duration_since(last) < self.debounce {
                debug!("[AppState] {:?} coalesced into the previous sync request", event);
                return false;
            }
        }
        state.last_request = Some(now);
        let on_request_sync = Arc::clone(&config.on_request_sync);
        drop(state);

        info!("[AppState] {:?}: requesting sync", event);
        on_request_sync();
        true
    }
}

#[async_trait]
impl AppState for LifecycleAppState {
    fn init(&self, config: AppStateConfig) {
        if self.config.set(config).is_err() {
            warn!("[AppState] init called more than once; keeping the first observer");
            return;
        }
        debug!("[AppState] Lifecycle observer registered");
    }

    async fn reset(&self) -> Result<()> {
        if let Ok(mut state) = self.state.lock() {
            state.last_request = None;
        }
        self.reset.reset_sync_state().await
    }

    fn handle_event(&self, event: LifecycleEvent) -> bool {
        self.notify(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_config() -> (AppStateConfig, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let config = AppStateConfig::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (config, calls)
    }

    fn observer() -> LifecycleAppState {
        LifecycleAppState::new(Arc::new(NoSyncStateReset))
    }

    struct FailingReset;

    #[async_trait]
    impl SyncStateReset for FailingReset {
        async fn reset_sync_state(&self) -> Result<()> {
            Err(Error::reset("sync cursor store unavailable"))
        }
    }

    #[test]
    fn back_to_back_resumes_each_request_sync_by_default() {
        let app_state = observer();
        let (config, calls) = counting_config();
        app_state.init(config);

        for _ in 0..2 {
            app_state.notify(LifecycleEvent::Hidden);
            assert!(app_state.notify(LifecycleEvent::Visible));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resume_requests_sync_exactly_once() {
        let app_state = observer();
        let (config, calls) = counting_config();
        app_state.init(config);

        assert!(!app_state.notify(LifecycleEvent::Background));
        assert!(app_state.notify(LifecycleEvent::Foreground));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_resume_events_are_deduplicated() {
        let app_state = observer();
        let (config, calls) = counting_config();
        app_state.init(config);

        app_state.notify(LifecycleEvent::Hidden);
        app_state.notify(LifecycleEvent::Visible);
        app_state.notify(LifecycleEvent::FocusGained);
        app_state.notify(LifecycleEvent::Foreground);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn each_separate_transition_requests_again() {
        let app_state = observer();
        let (config, calls) = counting_config();
        app_state.init(config);

        for _ in 0..3 {
            app_state.notify(LifecycleEvent::Background);
            app_state.notify(LifecycleEvent::Foreground);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rapid_flapping_is_coalesced_within_debounce() {
        let app_state = LifecycleAppState::new(Arc::new(NoSyncStateReset))
            .with_debounce(Duration::from_secs(60));
        let (config, calls) = counting_config();
        app_state.init(config);

        for _ in 0..5 {
            app_state.notify(LifecycleEvent::Hidden);
            app_state.notify(LifecycleEvent::Visible);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_before_init_never_request_sync() {
        let app_state = observer();
        assert!(!app_state.notify(LifecycleEvent::Background));
        assert!(!app_state.notify(LifecycleEvent::Foreground));

        let (config, calls) = counting_config();
        app_state.init(config);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(app_state.is_initialized());
    }

    #[test]
    fn second_init_keeps_first_observer() {
        let app_state = observer();
        let (first, first_calls) = counting_config();
        let (second, second_calls) = counting_config();
        app_state.init(first);
        app_state.init(second);

        app_state.notify(LifecycleEvent::Background);
        app_state.notify(LifecycleEvent::Foreground);

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn custom_policy_decides_what_qualifies() {
        struct FocusOnly;
        impl LifecyclePolicy for FocusOnly {
            fn is_qualifying(&self, _previous: LifecyclePhase, event: LifecycleEvent) -> bool {
                event == LifecycleEvent::FocusGained
            }
        }

        let app_state = observer().with_policy(FocusOnly);
        let (config, calls) = counting_config();
        app_state.init(config);

        app_state.notify(LifecycleEvent::Background);
        app_state.notify(LifecycleEvent::Foreground);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        app_state.notify(LifecycleEvent::FocusGained);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn starting_inactive_makes_first_foreground_qualify() {
        let app_state = observer().with_initial_phase(LifecyclePhase::Inactive);
        let (config, calls) = counting_config();
        app_state.init(config);

        assert!(app_state.notify(LifecycleEvent::Foreground));
        assert_eq!(app_state.phase(), Some(LifecyclePhase::Active));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_app_state_never_requests_sync() {
        let app_state = NoopAppState::default();
        let (config, calls) = counting_config();
        app_state.init(config);

        assert!(!app_state.handle_event(LifecycleEvent::Background));
        assert!(!app_state.handle_event(LifecycleEvent::Foreground));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reset_clears_debounce_and_delegates() {
        let app_state = LifecycleAppState::new(Arc::new(NoSyncStateReset))
            .with_debounce(Duration::from_secs(60));
        let (config, calls) = counting_config();
        app_state.init(config);

        app_state.notify(LifecycleEvent::Background);
        app_state.notify(LifecycleEvent::Foreground);
        app_state.reset().await.expect("reset");
        app_state.notify(LifecycleEvent::Background);
        app_state.notify(LifecycleEvent::Foreground);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reset_failure_comes_from_client_hook() {
        let app_state = NoopAppState::new(Arc::new(FailingReset));
        let err = app_state.reset().await.expect_err("reset should fail");
        assert!(matches!(err, Error::Reset(_)));
    }

    #[test]
    fn lifecycle_events_serialize_snake_case() {
        let json = serde_json::to_string(&LifecycleEvent::FocusGained).expect("serialize");
        assert_eq!(json, "\"focus_gained\"");
    }
}
