//! MCP tool implementations.
//!
//! This module contains all tools exposed by the pocketsw server. Each tool
//! is a free function over the shared [`ServiceWorker`](pocketsw_client::ServiceWorker)
//! so it can be tested without a transport.

pub mod cache;
pub mod fetch;
pub mod metrics;
pub mod prefetch;

#[cfg(test)]
pub(crate) mod testing;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

pub use fetch::FetchResourceParams;
pub use prefetch::PrefetchParams;

/// Encode a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ToolError::Serialize(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
