//! Core types and shared functionality for btx-offline.
//!
//! This crate provides:
//! - Cache bucket storage (SQLite and in-memory) behind [`CacheStorage`]
//! - Request/response types and the [`Network`] seam
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod net;

pub use cache::{CacheDb, CacheStorage, MatchOptions, MemoryStorage};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use net::{AssetRequest, AssetResponse, Network};
