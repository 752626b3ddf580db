//! prefetch_resources tool implementation.
//!
//! Warms the dynamic partition with a list of URLs, four at a time.

use pocketsw_client::{Command, ServiceWorker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::json_result;

/// Input parameters for prefetch_resources tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PrefetchParams {
    /// URLs or origin-relative paths to cache.
    pub urls: Vec<String>,
}

/// Implementation of the prefetch_resources tool.
pub async fn prefetch_impl(worker: &ServiceWorker, params: PrefetchParams) -> Result<CallToolResult, McpError> {
    if params.urls.is_empty() {
        return Err(ToolError::InvalidInput("urls cannot be empty".into()).into());
    }

    let reply = worker.handle_message(Command::PrefetchResources { urls: params.urls }).await;
    json_result(&reply)
}

#[cfg(test)]
mod tests {
    use pocketsw_client::PrefetchReply;

    use super::*;
    use crate::tools::testing::{active_worker, output};

    #[tokio::test]
    async fn test_prefetch_mixed_results() {
        let worker = active_worker(&[("/", 200, "home"), ("/a.png", 200, "png")]).await;
        let params = PrefetchParams { urls: vec!["/a.png".into(), "/bad-url".into()] };

        let reply: PrefetchReply = output(&prefetch_impl(&worker, params).await.unwrap());

        assert_eq!(reply.results.len(), 2);
        assert_eq!(reply.results[0].url, "/a.png");
        assert!(reply.results[0].success);
        assert_eq!(reply.results[0].error, None);
        assert_eq!(reply.results[1].url, "/bad-url");
        assert!(!reply.results[1].success);
        assert!(reply.results[1].error.is_some());
    }

    #[tokio::test]
    async fn test_prefetch_empty_urls() {
        let worker = active_worker(&[("/", 200, "home")]).await;
        let result = prefetch_impl(&worker, PrefetchParams { urls: vec![] }).await;
        assert!(result.is_err());
    }
}
