//! Cache inspection tools.

pub mod lookup;
pub mod status;

pub use lookup::{CacheMatchParams, match_impl};
pub use status::status_impl;
