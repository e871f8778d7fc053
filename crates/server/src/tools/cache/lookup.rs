//! cache_match tool implementation.
//!
//! Looks a URL up in the current bucket without touching the network.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use btx_core::net::resolve;
use btx_core::{AssetRequest, CacheStorage, Error, MatchOptions};
use url::Url;

use crate::tools::{body_digest, json_result};

/// Parameters for the cache_match tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMatchParams {
    /// URL to look up; relative paths resolve against the scope.
    pub url: String,

    /// Ignore the query string when matching (default: true).
    #[serde(default = "default_true")]
    pub ignore_search: bool,
}

fn default_true() -> bool {
    true
}

/// Output from the cache_match tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMatchOutput {
    pub bucket: String,
    /// URL the entry was stored under.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body_bytes: usize,
    pub body_sha256: String,
}

/// Implementation of the cache_match tool.
pub async fn match_impl(
    storage: &dyn CacheStorage, scope: &Url, bucket: &str, params: CacheMatchParams,
) -> Result<CallToolResult, McpError> {
    let url = resolve(scope, &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let request = AssetRequest::get(url);
    let options = MatchOptions { ignore_search: params.ignore_search };

    let response = storage
        .match_request(bucket, &request, options)
        .await?
        .ok_or_else(|| Error::CacheMiss(request.url.to_string()))?;

    let output = CacheMatchOutput {
        bucket: bucket.to_string(),
        url: response.url.to_string(),
        status: response.status,
        content_type: response.content_type().map(str::to_string),
        body_bytes: response.body.len(),
        body_sha256: body_digest(&response.body),
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{output_text, scope};
    use btx_core::{AssetResponse, MemoryStorage};

    async fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.open("btx-offline-v1").await.unwrap();
        let url = scope().join("index.html").unwrap();
        let response = AssetResponse::new(url.clone(), 200, vec![("Content-Type".into(), "text/html".into())], "<h1>hi</h1>");
        storage.put("btx-offline-v1", &AssetRequest::get(url), &response).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_match_ignores_query() {
        let storage = seeded().await;
        let params = CacheMatchParams { url: "/index.html?x=2".into(), ignore_search: true };

        let result = match_impl(&storage, &scope(), "btx-offline-v1", params).await.unwrap();
        let output: CacheMatchOutput = serde_json::from_str(&output_text(&result)).unwrap();

        assert_eq!(output.url, "http://127.0.0.1:8080/index.html");
        assert_eq!(output.content_type.as_deref(), Some("text/html"));
        assert_eq!(output.body_bytes, 11);
    }

    #[tokio::test]
    async fn test_match_exact_misses_with_query() {
        let storage = seeded().await;
        let params = CacheMatchParams { url: "/index.html?x=2".into(), ignore_search: false };

        let err = match_impl(&storage, &scope(), "btx-offline-v1", params).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
        assert!(err.message.starts_with("CACHE_MISS"));
    }

    #[tokio::test]
    async fn test_match_missing_bucket_is_miss() {
        let storage = MemoryStorage::new();
        let params = CacheMatchParams { url: "/".into(), ignore_search: true };

        let err = match_impl(&storage, &scope(), "btx-offline-v1", params).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
    }
}
