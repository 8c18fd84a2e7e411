//! HTTP transport for the localsync client.

mod client;
mod config;
mod error;

pub use client::HttpFetch;
pub use config::HttpFetchConfig;
pub use error::{Result, TransportError};
