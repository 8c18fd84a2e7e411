//! Platform capabilities the sync client is assembled from.
//!
//! Each capability is a trait with interchangeable implementations chosen by
//! the composition root: sync lock, storage worker lock, network fetch, app
//! lifecycle and UI flush, plus the DOM capability probe that selects between
//! them.

mod app_state;
mod db_worker_lock;
mod environment;
mod fetch;
mod flush_sync;
mod sync_lock;

pub use app_state::*;
pub use db_worker_lock::*;
pub use environment::*;
pub use fetch::*;
pub use flush_sync::*;
pub use sync_lock::*;
