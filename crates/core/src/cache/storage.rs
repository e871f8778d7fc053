//! The bucket storage seam.
//!
//! Mirrors the browser's cache storage: named buckets of request → response
//! pairs. The controller only ever sees `Arc<dyn CacheStorage>`.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::net::{AssetRequest, AssetResponse};

/// Lookup options for [`CacheStorage::match_request`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Ignore the query string when comparing URLs.
    pub ignore_search: bool,
}

impl MatchOptions {
    pub fn ignore_search() -> Self {
        Self { ignore_search: true }
    }
}

/// Metadata of one stored entry, without its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntryMeta {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body_size: u64,
    pub stored_at: String,
}

/// Entry count and byte total of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BucketSummary {
    pub name: String,
    pub entries: u64,
    pub bytes: u64,
}

/// Named request → response buckets.
///
/// Writes are per key and last-write-wins. Bucket names are returned in
/// creation order.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if absent. Returns true if it was created.
    async fn open(&self, name: &str) -> Result<bool, Error>;

    async fn has(&self, name: &str) -> Result<bool, Error>;

    /// All bucket names.
    async fn keys(&self) -> Result<Vec<String>, Error>;

    /// Delete a bucket and its entries. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Look up the stored response for a request.
    ///
    /// With `ignore_search`, an entry for the exact URL wins over other
    /// entries sharing the path; otherwise the earliest stored one is used.
    async fn match_request(
        &self, bucket: &str, request: &AssetRequest, options: MatchOptions,
    ) -> Result<Option<AssetResponse>, Error>;

    /// Store one response, replacing any entry with the same exact key.
    async fn put(&self, bucket: &str, request: &AssetRequest, response: &AssetResponse) -> Result<(), Error>;

    /// Store a batch atomically: either every pair is written or none is.
    async fn put_all(&self, bucket: &str, entries: &[(AssetRequest, AssetResponse)]) -> Result<(), Error>;

    /// Entry metadata of one bucket in insertion order.
    async fn entries(&self, bucket: &str) -> Result<Vec<EntryMeta>, Error>;

    /// Summaries of every bucket.
    async fn summaries(&self) -> Result<Vec<BucketSummary>, Error>;
}

/// Checks shared by every storage backend before a write.
pub(crate) fn check_storable(request: &AssetRequest, response: &AssetResponse) -> Result<(), Error> {
    if !request.is_get() {
        return Err(Error::NotCacheable(format!("method {}", request.method)));
    }
    response.check_cacheable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_check_storable_rejects_post() {
        let url = Url::parse("http://127.0.0.1:8080/api").unwrap();
        let req = AssetRequest::new("POST", url.clone());
        let resp = AssetResponse::new(url, 200, Vec::new(), "ok");
        let err = check_storable(&req, &resp).unwrap_err();
        assert!(err.is_not_cacheable());
        assert!(err.to_string().contains("POST"));
    }

    #[test]
    fn test_match_options_default() {
        assert!(!MatchOptions::default().ignore_search);
        assert!(MatchOptions::ignore_search().ignore_search);
    }
}
