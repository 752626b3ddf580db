//! clear_cache tool implementation.
//!
//! Deletes every cache partition, whatever its version.

use pocketsw_client::{Command, ServiceWorker};
use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;

/// Implementation of the clear_cache tool.
///
/// Failures are reported in the reply (`success: false`), not as a tool error.
pub async fn clear_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let reply = worker.handle_message(Command::ClearCache).await;
    json_result(&reply)
}
