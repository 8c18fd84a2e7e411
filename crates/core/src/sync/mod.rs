//! Sync attempt models and the sync engine contract.

mod sync_model;
mod sync_round;

pub use sync_model::*;
pub use sync_round::*;
