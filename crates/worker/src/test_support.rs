//! Fakes shared by the controller and registration tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use btx_core::cache::{BucketSummary, EntryMeta};
use btx_core::{AssetRequest, AssetResponse, CacheStorage, Error, MatchOptions, MemoryStorage, Network};
use url::Url;

pub fn scope() -> Url {
    Url::parse("http://127.0.0.1:8080/").unwrap()
}

pub fn url(path: &str) -> Url {
    scope().join(path).unwrap()
}

/// Serves a fixed set of paths; anything else is a 404.
pub struct FakeNetwork {
    assets: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl FakeNetwork {
    /// A site serving every default manifest asset as `body of <path>`.
    pub fn site() -> Self {
        let assets = ["/", "/index.html", "/styles.css", "/app.js", "/manifest.json", "/icons/icon-192.png", "/icons/icon-512.png"]
            .into_iter()
            .map(|path| (path.to_string(), format!("body of {path}")))
            .collect();
        Self { assets: Mutex::new(assets), calls: AtomicUsize::new(0), offline: AtomicBool::new(false) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_body(&self, path: &str, body: impl Into<String>) {
        self.assets.lock().unwrap().insert(path.to_string(), body.into());
    }

    pub fn remove(&self, path: &str) {
        self.assets.lock().unwrap().remove(path);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NetworkError(format!("{}: connection refused", request.url)));
        }
        let body = self.assets.lock().unwrap().get(request.url.path()).cloned();
        let response = match body {
            Some(body) => {
                AssetResponse::new(request.url.clone(), 200, vec![("content-type".into(), "text/plain".into())], body)
            }
            None => AssetResponse::new(request.url.clone(), 404, Vec::new(), "not found"),
        };
        Ok(response)
    }
}

/// A network whose requests never complete.
pub struct StalledNetwork;

#[async_trait]
impl Network for StalledNetwork {
    async fn fetch(&self, _request: &AssetRequest) -> Result<AssetResponse, Error> {
        std::future::pending().await
    }
}

/// [`MemoryStorage`] that counts entry reads and writes.
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    touches: AtomicUsize,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.touches.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for CountingStorage {
    async fn open(&self, name: &str) -> Result<bool, Error> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        self.inner.delete(name).await
    }

    async fn match_request(
        &self, bucket: &str, request: &AssetRequest, options: MatchOptions,
    ) -> Result<Option<AssetResponse>, Error> {
        self.touch();
        self.inner.match_request(bucket, request, options).await
    }

    async fn put(&self, bucket: &str, request: &AssetRequest, response: &AssetResponse) -> Result<(), Error> {
        self.touch();
        self.inner.put(bucket, request, response).await
    }

    async fn put_all(&self, bucket: &str, entries: &[(AssetRequest, AssetResponse)]) -> Result<(), Error> {
        self.touch();
        self.inner.put_all(bucket, entries).await
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<EntryMeta>, Error> {
        self.inner.entries(bucket).await
    }

    async fn summaries(&self) -> Result<Vec<BucketSummary>, Error> {
        self.inner.summaries().await
    }
}
