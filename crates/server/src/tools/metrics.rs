//! get_metrics tool implementation.

use pocketsw_client::{Command, ServiceWorker};
use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;

/// Implementation of the get_metrics tool.
pub async fn metrics_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let reply = worker.handle_message(Command::GetMetrics).await;
    json_result(&reply)
}
