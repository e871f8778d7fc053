//! MCP tool implementations.
//!
//! This module contains all tools exposed by the btx-cache server.

pub mod asset_fetch;
pub mod cache;

pub use asset_fetch::{AssetFetchParams, fetch_impl};

use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ToolError;

/// Hex SHA-256 of a response body.
pub(crate) fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ToolError::OutputFailed(format!("failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_digest() {
        assert_eq!(body_digest(b""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }
}
