//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use btx_core::{AppConfig, CacheStorage};
use btx_worker::{ClientId, Registration};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::cache::{CacheMatchParams, match_impl, status_impl};
use crate::tools::{AssetFetchParams, fetch_impl};

/// The main MCP server handler for btx-cache.
///
/// Holds one client view of the registration; every `asset_fetch` is a
/// request made by that view.
#[derive(Clone)]
pub struct BtxCacheServer {
    registration: Arc<Registration>,
    storage: Arc<dyn CacheStorage>,
    client: ClientId,
    version: String,
    bucket: String,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl BtxCacheServer {
    /// Create a new server handler.
    pub fn new(
        registration: Arc<Registration>, storage: Arc<dyn CacheStorage>, client: ClientId, config: &AppConfig,
    ) -> Self {
        Self {
            registration,
            storage,
            client,
            version: config.cache_version.clone(),
            bucket: config.bucket_name(),
            tool_router: Self::tool_router(),
        }
    }

    /// Fetch an asset the way a page in scope would.
    #[tool(
        description = "Fetch a URL through the offline cache controller. Same-origin GETs are served cache-first; \
                       returns status, source (cache/network/passthrough), headers and body."
    )]
    async fn asset_fetch(&self, params: Parameters<AssetFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.registration, self.client, params.0).await
    }

    #[tool(description = "Report cache version, active worker state and every cache bucket with entry counts and sizes.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.registration, self.storage.as_ref(), &self.version, &self.bucket).await
    }

    #[tool(description = "Look a URL up in the current cache bucket without using the network.")]
    async fn cache_match(&self, params: Parameters<CacheMatchParams>) -> Result<CallToolResult, McpError> {
        match_impl(self.storage.as_ref(), self.registration.scope(), &self.bucket, params.0).await
    }
}

impl ServerHandler for BtxCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "btx-cache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
