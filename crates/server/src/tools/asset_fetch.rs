//! asset_fetch tool implementation.
//!
//! Dispatches a request from the server's client view through the
//! registration, exactly as an intercepted page request would be.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use btx_core::net::resolve;
use btx_core::{AssetRequest, Error};
use btx_worker::{ClientId, Registration};

use super::{body_digest, json_result};
use crate::error::ToolError;

/// Input parameters for the asset_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetFetchParams {
    /// URL to fetch; relative paths resolve against the scope.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the asset_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetFetchOutput {
    pub url: String,
    pub status: u16,
    /// "cache", "network" or "passthrough".
    pub source: String,
    pub headers: Vec<(String, String)>,
    /// Body decoded as lossy UTF-8.
    pub body: String,
    pub body_bytes: usize,
    pub body_sha256: String,
}

/// Implementation of the asset_fetch tool.
pub async fn fetch_impl(
    registration: &Registration, client: ClientId, params: AssetFetchParams,
) -> Result<CallToolResult, McpError> {
    if params.method.trim().is_empty() {
        return Err(ToolError::InvalidInput("method must not be empty".into()).into());
    }
    let url = resolve(registration.scope(), &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let request = AssetRequest::new(&params.method, url);

    let dispatched = registration.dispatch_fetch(client, &request).await?;
    let response = dispatched.response;

    tracing::debug!(url = %request.url, source = %dispatched.source, status = response.status, "asset fetched");

    let output = AssetFetchOutput {
        url: request.url.to_string(),
        status: response.status,
        source: dispatched.source.to_string(),
        body: String::from_utf8_lossy(&response.body).into_owned(),
        body_bytes: response.body.len(),
        body_sha256: body_digest(&response.body),
        headers: response.headers,
    };
    json_result(&output)
}
