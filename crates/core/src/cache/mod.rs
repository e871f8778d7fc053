//! Versioned cache buckets.
//!
//! Buckets hold request → response pairs keyed by SHA-256 request keys:
//!
//! - [`CacheStorage`] is the seam the controller is written against
//! - [`CacheDb`] persists buckets in SQLite via tokio-rusqlite (WAL mode,
//!   embedded migrations, atomic batch writes, storage quota)
//! - [`MemoryStorage`] keeps the same semantics in memory

pub mod buckets;
pub mod connection;
pub mod hash;
pub mod memory;
pub mod migrations;
pub mod storage;

pub use crate::Error;

pub use connection::{CacheDb, DEFAULT_QUOTA_BYTES};
pub use memory::MemoryStorage;
pub use storage::{BucketSummary, CacheStorage, EntryMeta, MatchOptions};
