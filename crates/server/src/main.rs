//! btx-cache server entry point.
//!
//! Boots the offline cache controller for the configured scope and exposes it
//! over MCP on stdio. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use btx_client::{FetchConfig, HttpFetcher};
use btx_core::{AppConfig, CacheDb, CacheStorage, MemoryStorage, Network};
use btx_worker::{OfflineWorker, Registration, WorkerConfig};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        scope = %config.scope_url,
        bucket = %config.bucket_name(),
        in_memory = config.in_memory,
        "Starting btx-cache server on stdio transport"
    );

    let storage: Arc<dyn CacheStorage> = if config.in_memory {
        Arc::new(MemoryStorage::new().with_quota(config.quota_bytes))
    } else {
        Arc::new(CacheDb::open(&config.db_path).await?.with_quota(config.quota_bytes))
    };
    let network: Arc<dyn Network> = Arc::new(HttpFetcher::new(FetchConfig::from(&config))?);

    let registration = Arc::new(Registration::new(config.scope()?, Arc::clone(&network)));
    let client = registration.open_client().await;

    let worker = Arc::new(OfflineWorker::new(WorkerConfig::from_app(&config)?, Arc::clone(&storage), network));
    let installer = Arc::clone(&registration);
    tokio::spawn(async move {
        if let Err(err) = installer.register(worker).await {
            tracing::warn!(error = %err, "worker registration failed; requests go straight to the network");
        }
    });

    let handler = handler::BtxCacheServer::new(Arc::clone(&registration), storage, client, &config);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    let flushed = registration.flush_pending_stores().await;
    tracing::info!(flushed, "btx-cache server stopped");

    Ok(())
}
