//! Network transport for btx-offline.
//!
//! Provides the reqwest-backed [`btx_core::Network`] used as the normal
//! network path, both for passthrough requests and for cache misses.

pub mod fetch;

pub use fetch::{FetchConfig, HttpFetcher};
