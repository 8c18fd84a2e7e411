//! localsync client assembly.
//!
//! Builds the platform services from configuration and coordinates sync
//! attempts triggered by the app lifecycle, timers or the user.

mod config;
mod context;
mod engine;

pub use config::ClientConfig;
pub use context::PlatformContext;
pub use engine::SyncCoordinator;
