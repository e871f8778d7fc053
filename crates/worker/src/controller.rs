//! The offline asset cache controller.
//!
//! One [`OfflineWorker`] owns one versioned bucket. It populates the bucket on
//! install, removes every other bucket on activate, and answers intercepted
//! fetches cache-first, with the query string ignored on lookup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use btx_core::net::same_origin;
use btx_core::{AppConfig, AssetRequest, AssetResponse, CacheStorage, Error, MatchOptions, Network};
use futures_util::future::{join_all, try_join_all};
use tokio::sync::watch;
use tokio::task::JoinSet;
use url::Url;

use crate::lifecycle::{WorkerId, WorkerState};
use crate::manifest::AssetManifest;

/// Static settings of one worker version.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bucket owned by this version.
    pub bucket: String,
    /// Scope URL; its origin decides what is intercepted.
    pub scope: Url,
    pub manifest: AssetManifest,
    /// Ask for activation as soon as install succeeds (default: true).
    pub skip_waiting: bool,
}

impl WorkerConfig {
    pub fn new(bucket: impl Into<String>, scope: Url, manifest: AssetManifest) -> Self {
        Self { bucket: bucket.into(), scope, manifest, skip_waiting: true }
    }

    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }

    /// Build from application configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the scope URL does not parse.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let scope = config.scope().map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self::new(config.bucket_name(), scope, AssetManifest::new(config.manifest.iter().cloned())))
    }
}

/// Result of intercepting one request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not ours to handle; the caller performs the default network fetch.
    Passthrough,
    /// Served from the current bucket.
    Cache(AssetResponse),
    /// Fetched from the network after a miss; a store was scheduled.
    Network(AssetResponse),
}

/// The offline cache controller for one deployed version.
pub struct OfflineWorker {
    id: WorkerId,
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
    pending: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("id", &self.id)
            .field("bucket", &self.config.bucket)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        let (state, _) = watch::channel(WorkerState::Uninstalled);
        Self {
            id: WorkerId::next(),
            config,
            storage,
            network,
            state,
            skip_waiting: AtomicBool::new(false),
            pending: Mutex::new(JoinSet::new()),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn scope(&self) -> &Url {
        &self.config.scope
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Whether this worker asked to activate without waiting for old clients.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    fn transition(&self, to: WorkerState) -> Result<(), Error> {
        let mut result = Ok(());
        self.state.send_if_modified(|current| {
            if current.can_transition_to(to) {
                *current = to;
                true
            } else {
                result = Err(Error::InvalidStateTransition { from: current.to_string(), to: to.to_string() });
                false
            }
        });
        if result.is_ok() {
            tracing::debug!(worker = %self.id, state = %to, "worker state changed");
        }
        result
    }

    /// Mark this worker as superseded.
    pub fn retire(&self) {
        if self.transition(WorkerState::Redundant).is_ok() {
            tracing::info!(worker = %self.id, bucket = %self.config.bucket, "worker retired");
        }
    }

    /// Pre-populate the bucket with every manifest asset.
    ///
    /// All assets are fetched concurrently and committed in one atomic batch,
    /// so the bucket ends up with either the whole manifest or nothing new.
    /// On success the worker requests immediate activation unless its config
    /// opts out.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` naming the first asset that could not be
    /// fetched or returned a non-success status, or any storage error raised
    /// while committing. The worker becomes redundant.
    pub async fn install(&self) -> Result<(), Error> {
        self.transition(WorkerState::Installing)?;
        let start = Instant::now();

        match self.populate().await {
            Ok(count) => {
                self.transition(WorkerState::Installed)?;
                self.skip_waiting.store(self.config.skip_waiting, Ordering::Release);
                tracing::info!(
                    worker = %self.id,
                    bucket = %self.config.bucket,
                    assets = count,
                    install_ms = start.elapsed().as_millis() as u64,
                    "install complete"
                );
                Ok(())
            }
            Err(err) => {
                self.retire();
                tracing::warn!(worker = %self.id, bucket = %self.config.bucket, error = %err, "install failed");
                Err(err)
            }
        }
    }

    async fn populate(&self) -> Result<usize, Error> {
        let urls = self.config.manifest.resolve(&self.config.scope)?;
        let entries = try_join_all(urls.into_iter().map(|url| self.fetch_asset(url))).await?;

        // The bucket only appears once every asset is in hand.
        let created = self.storage.open(&self.config.bucket).await?;
        let result = self.storage.put_all(&self.config.bucket, &entries).await.map(|()| entries.len());

        if result.is_err()
            && created
            && let Err(err) = self.storage.delete(&self.config.bucket).await
        {
            tracing::warn!(bucket = %self.config.bucket, error = %err, "failed to drop empty bucket");
        }
        result
    }

    async fn fetch_asset(&self, url: Url) -> Result<(AssetRequest, AssetResponse), Error> {
        let request = AssetRequest::get(url);
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed { asset: request.url.to_string(), reason: e.to_string() })?;

        if !response.ok() {
            return Err(Error::InstallFailed {
                asset: request.url.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        Ok((request, response))
    }

    /// Delete every bucket except the current one and become active.
    ///
    /// Deletions are best-effort: a failure is logged and activation still
    /// completes. Returns the names of the buckets that were removed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` unless the worker is installed.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        self.transition(WorkerState::Activating)?;

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(worker = %self.id, error = %err, "failed to list buckets; skipping cleanup");
                Vec::new()
            }
        };

        let stale = names.into_iter().filter(|name| *name != self.config.bucket);
        let results = join_all(stale.map(|name| async move {
            let result = self.storage.delete(&name).await;
            (name, result)
        }))
        .await;

        let mut deleted = Vec::new();
        for (name, result) in results {
            match result {
                Ok(true) => deleted.push(name),
                Ok(false) => {}
                Err(err) => tracing::warn!(bucket = %name, error = %err, "failed to delete stale bucket"),
            }
        }

        self.transition(WorkerState::Active)?;
        tracing::info!(worker = %self.id, bucket = %self.config.bucket, deleted = ?deleted, "worker active");
        Ok(deleted)
    }

    /// Decide how one intercepted request is answered.
    ///
    /// Non-GET and cross-origin requests pass through untouched. Otherwise
    /// the current bucket is consulted ignoring the query string; on a miss
    /// the network response is returned and a store runs detached.
    ///
    /// # Errors
    ///
    /// Network failures on a miss propagate unchanged. There is no offline
    /// fallback.
    pub async fn handle_fetch(&self, request: &AssetRequest) -> Result<FetchOutcome, Error> {
        if self.state() != WorkerState::Active
            || !request.is_get()
            || !same_origin(&request.url, &self.config.scope)
        {
            return Ok(FetchOutcome::Passthrough);
        }

        match self
            .storage
            .match_request(&self.config.bucket, request, MatchOptions::ignore_search())
            .await
        {
            Ok(Some(response)) => {
                tracing::debug!(url = %request.url, "cache hit");
                return Ok(FetchOutcome::Cache(response));
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(url = %request.url, error = %err, "cache lookup failed; using network"),
        }

        let response = self.network.fetch(request).await?;
        tracing::debug!(url = %request.url, status = response.status, "cache miss served from network");
        self.spawn_store(request.clone(), response.clone());
        Ok(FetchOutcome::Network(response))
    }

    fn spawn_store(&self, request: AssetRequest, response: AssetResponse) {
        let storage = Arc::clone(&self.storage);
        let bucket = self.config.bucket.clone();

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            if let Err(err) = storage.put(&bucket, &request, &response).await {
                log_store_failure(&request, &err);
            }
        });
    }

    /// Number of detached stores not yet reaped.
    pub fn pending_stores(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Wait for every detached store scheduled so far.
    ///
    /// Returns how many stores were awaited.
    pub async fn flush_pending_stores(&self) -> usize {
        let mut set = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        let mut joined = 0;
        while let Some(result) = set.join_next().await {
            joined += 1;
            if let Err(err) = result {
                tracing::warn!(error = %err, "store task aborted");
            }
        }
        joined
    }
}

fn log_store_failure(request: &AssetRequest, err: &Error) {
    match err {
        Error::NotCacheable(reason) => {
            tracing::debug!(url = %request.url, reason = %reason, "response not stored");
        }
        Error::BucketNotFound(bucket) => {
            tracing::debug!(url = %request.url, bucket = %bucket, "bucket gone; response not stored");
        }
        _ => tracing::warn!(url = %request.url, error = %err, "failed to store response"),
    }
}
