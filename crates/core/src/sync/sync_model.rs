//! Sync attempt value types.

use serde::{Deserialize, Serialize};

/// Trigger source for sync attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleTrigger {
    Startup,
    Foreground,
    LocalMutation,
    Periodic,
    Manual,
}

/// Why an attempt did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSkipReason {
    /// Another attempt holds the sync lock.
    LockHeld,
}

/// Result of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncAttemptOutcome {
    Completed,
    Skipped {
        reason: SyncSkipReason,
    },
    Failed {
        message: String,
        /// The endpoint was unreachable; the next trigger should retry.
        network: bool,
    },
}

impl SyncAttemptOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Short status code for logs and telemetry.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed => "ok",
            Self::Skipped { .. } => "skipped",
            Self::Failed { network: true, .. } => "network_error",
            Self::Failed { .. } => "sync_error",
        }
    }
}

/// Summary of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAttemptReport {
    pub attempt_id: String,
    pub trigger: SyncCycleTrigger,
    pub outcome: SyncAttemptOutcome,
    pub started_at: String,
    pub duration_ms: i64,
}
