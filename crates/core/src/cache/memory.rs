//! In-memory [`CacheStorage`] for tests and throwaway sessions.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::connection::DEFAULT_QUOTA_BYTES;
use super::hash::RequestKey;
use super::storage::{BucketSummary, CacheStorage, EntryMeta, MatchOptions, check_storable};
use crate::Error;
use crate::net::{AssetRequest, AssetResponse};

#[derive(Debug, Clone)]
struct MemoryEntry {
    key: RequestKey,
    method: String,
    response: AssetResponse,
    stored_at: String,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    name: String,
    entries: Vec<MemoryEntry>,
}

impl MemoryBucket {
    fn bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.response.body.len() as u64).sum()
    }

    fn upsert(&mut self, entry: MemoryEntry) {
        match self.entries.iter_mut().find(|e| e.key.exact == entry.key.exact) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }
}

/// Buckets kept in a vector behind a tokio RwLock, in creation order.
#[derive(Debug)]
pub struct MemoryStorage {
    buckets: RwLock<Vec<MemoryBucket>>,
    quota_bytes: u64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { buckets: RwLock::new(Vec::new()), quota_bytes: DEFAULT_QUOTA_BYTES }
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    async fn write_batch(&self, bucket: &str, entries: Vec<MemoryEntry>) -> Result<(), Error> {
        let mut buckets = self.buckets.write().await;
        let index = buckets
            .iter()
            .position(|b| b.name == bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.to_string()))?;

        let mut staged = MemoryBucket { name: bucket.to_string(), entries: buckets[index].entries.clone() };
        for entry in entries {
            staged.upsert(entry);
        }

        let others: u64 = buckets
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, b)| b.bytes())
            .sum();
        let used = others + staged.bytes();
        if used > self.quota_bytes {
            return Err(Error::QuotaExceeded { needed: used, available: self.quota_bytes });
        }

        buckets[index] = staged;
        Ok(())
    }
}

fn to_entry(request: &AssetRequest, response: &AssetResponse, stored_at: &str) -> Result<MemoryEntry, Error> {
    check_storable(request, response)?;
    Ok(MemoryEntry {
        key: RequestKey::of(request),
        method: request.method.clone(),
        response: AssetResponse { url: request.url.clone(), ..response.clone() },
        stored_at: stored_at.to_string(),
    })
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<bool, Error> {
        let mut buckets = self.buckets.write().await;
        if buckets.iter().any(|b| b.name == name) {
            return Ok(false);
        }
        buckets.push(MemoryBucket { name: name.to_string(), entries: Vec::new() });
        Ok(true)
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        Ok(self.buckets.read().await.iter().any(|b| b.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.buckets.read().await.iter().map(|b| b.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|b| b.name != name);
        Ok(buckets.len() != before)
    }

    async fn match_request(
        &self, bucket: &str, request: &AssetRequest, options: MatchOptions,
    ) -> Result<Option<AssetResponse>, Error> {
        let buckets = self.buckets.read().await;
        let Some(bucket) = buckets.iter().find(|b| b.name == bucket) else {
            return Ok(None);
        };
        let key = RequestKey::of(request);

        let exact = bucket.entries.iter().find(|e| e.key.exact == key.exact);
        let found = if options.ignore_search {
            exact.or_else(|| bucket.entries.iter().find(|e| e.key.search == key.search))
        } else {
            exact
        };
        Ok(found.map(|e| e.response.clone()))
    }

    async fn put(&self, bucket: &str, request: &AssetRequest, response: &AssetResponse) -> Result<(), Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let entry = to_entry(request, response, &now)?;
        self.write_batch(bucket, vec![entry]).await
    }

    async fn put_all(&self, bucket: &str, entries: &[(AssetRequest, AssetResponse)]) -> Result<(), Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let staged = entries
            .iter()
            .map(|(req, resp)| to_entry(req, resp, &now))
            .collect::<Result<Vec<_>, _>>()?;
        self.write_batch(bucket, staged).await
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<EntryMeta>, Error> {
        let buckets = self.buckets.read().await;
        let Some(bucket) = buckets.iter().find(|b| b.name == bucket) else {
            return Ok(Vec::new());
        };
        Ok(bucket
            .entries
            .iter()
            .map(|e| EntryMeta {
                method: e.method.clone(),
                url: e.response.url.to_string(),
                status: e.response.status,
                content_type: e.response.content_type().map(str::to_string),
                body_size: e.response.body.len() as u64,
                stored_at: e.stored_at.clone(),
            })
            .collect())
    }

    async fn summaries(&self) -> Result<Vec<BucketSummary>, Error> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .map(|b| BucketSummary { name: b.name.clone(), entries: b.entries.len() as u64, bytes: b.bytes() })
            .collect())
    }
}
