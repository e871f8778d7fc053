//! cache_status tool implementation.
//!
//! Reports the current version, the controlling worker and every bucket.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use btx_core::CacheStorage;
use btx_core::cache::BucketSummary;
use btx_worker::Registration;

use crate::tools::json_result;

/// Output from the cache_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusOutput {
    /// Configured cache version.
    pub version: String,
    /// Bucket owned by the configured version.
    pub current_bucket: String,
    /// State of the active worker, if any.
    pub state: Option<String>,
    /// Bucket of the active worker, if any.
    pub active_bucket: Option<String>,
    /// Whether an installed worker is waiting to activate.
    pub waiting: bool,
    pub clients: usize,
    pub buckets: Vec<BucketSummary>,
}

/// Implementation of the cache_status tool.
pub async fn status_impl(
    registration: &Registration, storage: &dyn CacheStorage, version: &str, bucket: &str,
) -> Result<CallToolResult, McpError> {
    let active = registration.active().await;
    let output = CacheStatusOutput {
        version: version.to_string(),
        current_bucket: bucket.to_string(),
        state: active.as_ref().map(|w| w.state().to_string()),
        active_bucket: active.as_ref().map(|w| w.bucket().to_string()),
        waiting: registration.waiting().await.is_some(),
        clients: registration.client_count().await,
        buckets: storage.summaries().await?,
    };
    json_result(&output)
}
