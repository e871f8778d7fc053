//! Offline asset cache controller for btx-offline.
//!
//! - [`OfflineWorker`]: install, activate and cache-first fetch for one version
//! - [`Registration`]: which worker controls which client view
//! - [`AssetManifest`]: assets pre-populated on install

pub mod controller;
pub mod lifecycle;
pub mod manifest;
pub mod registration;

#[cfg(test)]
mod test_support;

pub use controller::{FetchOutcome, OfflineWorker, WorkerConfig};
pub use lifecycle::{ClientId, WorkerId, WorkerState};
pub use manifest::AssetManifest;
pub use registration::{Dispatched, Registration, ResponseSource};
