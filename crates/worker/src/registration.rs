//! Hosting registration: which worker controls which client view.
//!
//! A new client is controlled by whatever worker is active when it opens.
//! Installing a new version does not move existing clients until the new
//! worker activates and claims them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use btx_core::{AssetRequest, AssetResponse, Error, Network};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::controller::{FetchOutcome, OfflineWorker};
use crate::lifecycle::{ClientId, WorkerId};

/// Where a dispatched response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Network,
    /// The request bypassed the controller entirely.
    Passthrough,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::Passthrough => "passthrough",
        })
    }
}

/// A response together with the path that produced it.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub source: ResponseSource,
    pub response: AssetResponse,
}

#[derive(Default)]
struct Workers {
    active: Option<Arc<OfflineWorker>>,
    waiting: Option<Arc<OfflineWorker>>,
    clients: BTreeMap<ClientId, Option<Arc<OfflineWorker>>>,
}

/// Registration for one scope.
pub struct Registration {
    scope: Url,
    network: Arc<dyn Network>,
    workers: RwLock<Workers>,
}

impl Registration {
    pub fn new(scope: Url, network: Arc<dyn Network>) -> Self {
        Self { scope, network, workers: RwLock::new(Workers::default()) }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Open a client view, controlled by the currently active worker if any.
    pub async fn open_client(&self) -> ClientId {
        let id = ClientId::next();
        let mut workers = self.workers.write().await;
        let controller = workers.active.clone();
        workers.clients.insert(id, controller);
        tracing::debug!(client = %id, controlled = workers.clients[&id].is_some(), "client opened");
        id
    }

    /// Close a client view. Returns false if it was not open.
    pub async fn close_client(&self, client: ClientId) -> bool {
        self.workers.write().await.clients.remove(&client).is_some()
    }

    pub async fn client_count(&self) -> usize {
        self.workers.read().await.clients.len()
    }

    pub async fn active(&self) -> Option<Arc<OfflineWorker>> {
        self.workers.read().await.active.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<OfflineWorker>> {
        self.workers.read().await.waiting.clone()
    }

    /// Id of the worker controlling `client`.
    pub async fn controller(&self, client: ClientId) -> Option<WorkerId> {
        self.workers.read().await.clients.get(&client).and_then(|w| w.as_ref().map(|w| w.id()))
    }

    /// Install `worker` and, when allowed, activate it and claim every client.
    ///
    /// Without skip-waiting the worker waits while an older worker is active;
    /// [`Registration::clients_closed`] promotes it once no client remains.
    ///
    /// # Errors
    ///
    /// Install and activation failures are returned; the previously active
    /// worker keeps control.
    pub async fn register(&self, worker: Arc<OfflineWorker>) -> Result<(), Error> {
        if worker.scope() != &self.scope {
            return Err(Error::InvalidInput(format!(
                "worker scope {} does not match registration scope {}",
                worker.scope(),
                self.scope
            )));
        }

        tracing::info!(worker = %worker.id(), bucket = worker.bucket(), "registering worker");
        worker.install().await?;

        let has_active = self.workers.read().await.active.is_some();
        if worker.skip_waiting_requested() || !has_active {
            return self.promote(worker).await;
        }

        let mut workers = self.workers.write().await;
        if let Some(previous) = workers.waiting.replace(Arc::clone(&worker)) {
            previous.retire();
        }
        tracing::info!(worker = %worker.id(), "worker installed and waiting");
        Ok(())
    }

    /// Promote the waiting worker once every client view has closed.
    ///
    /// Returns whether a worker was promoted.
    ///
    /// # Errors
    ///
    /// Returns the activation error of the waiting worker.
    pub async fn clients_closed(&self) -> Result<bool, Error> {
        let waiting = {
            let mut workers = self.workers.write().await;
            if !workers.clients.is_empty() {
                return Ok(false);
            }
            workers.waiting.take()
        };
        match waiting {
            Some(worker) => self.promote(worker).await.map(|()| true),
            None => Ok(false),
        }
    }

    async fn promote(&self, worker: Arc<OfflineWorker>) -> Result<(), Error> {
        worker.activate().await?;

        let mut workers = self.workers.write().await;
        if let Some(previous) = workers.active.replace(Arc::clone(&worker)) {
            previous.retire();
        }
        if let Some(waiting) = workers.waiting.take()
            && waiting.id() != worker.id()
        {
            waiting.retire();
        }
        for controller in workers.clients.values_mut() {
            *controller = Some(Arc::clone(&worker));
        }
        tracing::info!(worker = %worker.id(), clients = workers.clients.len(), "claimed clients");
        Ok(())
    }

    /// Route one request from `client` through its controller.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unknown client and propagates
    /// network failures.
    pub async fn dispatch_fetch(&self, client: ClientId, request: &AssetRequest) -> Result<Dispatched, Error> {
        let controller = self
            .workers
            .read()
            .await
            .clients
            .get(&client)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("unknown client: {client}")))?;

        let outcome = match controller {
            Some(worker) => worker.handle_fetch(request).await?,
            None => FetchOutcome::Passthrough,
        };

        match outcome {
            FetchOutcome::Cache(response) => Ok(Dispatched { source: ResponseSource::Cache, response }),
            FetchOutcome::Network(response) => Ok(Dispatched { source: ResponseSource::Network, response }),
            FetchOutcome::Passthrough => {
                let response = self.network.fetch(request).await?;
                Ok(Dispatched { source: ResponseSource::Passthrough, response })
            }
        }
    }

    /// Wait for detached stores of the active worker.
    pub async fn flush_pending_stores(&self) -> usize {
        match self.active().await {
            Some(worker) => worker.flush_pending_stores().await,
            None => 0,
        }
    }
}
