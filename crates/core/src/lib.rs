//! Coordination layer of the localsync client.
//!
//! Keeps sync attempts mutually exclusive, serializes access to the local
//! storage worker, posts opaque payloads to the sync endpoint and turns app
//! lifecycle transitions into sync requests.

pub mod errors;
pub mod platform;
pub mod sync;

pub use errors::{Error, Result};
