//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker.
use std::sync::Arc;

use pocketsw_client::ServiceWorker;
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

use crate::tools::{
    FetchResourceParams, PrefetchParams,
    cache::{CacheGetParams, cleanup_impl, clear_impl, get_impl},
    fetch::fetch_impl,
    metrics::metrics_impl,
    prefetch::prefetch_impl,
};

/// The main MCP server handler for pocketsw.
#[derive(Clone)]
pub struct PocketServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<ServiceWorker>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl PocketServer {
    /// Create a new server handler around an installed worker.
    pub fn new(worker: Arc<ServiceWorker>) -> Self {
        Self { tool_router: Self::tool_router(), worker }
    }

    #[tool(description = "Request a resource through the cache worker. Reports status, source (cache, network, \
                          synthetic, passthrough), the strategy used, and the body.")]
    async fn fetch_resource(&self, params: Parameters<FetchResourceParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Current counters: cacheHits, cacheMisses, networkRequests, errors.")]
    async fn get_metrics(&self) -> Result<CallToolResult, McpError> {
        metrics_impl(&self.worker).await
    }

    #[tool(description = "Delete every cache partition. Returns {success, error?}.")]
    async fn clear_cache(&self) -> Result<CallToolResult, McpError> {
        clear_impl(&self.worker).await
    }

    #[tool(description = "Fetch URLs into the dynamic cache partition. Returns per-URL {url, success, error}.")]
    async fn prefetch_resources(&self, params: Parameters<PrefetchParams>) -> Result<CallToolResult, McpError> {
        prefetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Evict dynamic cache entries older than the configured max age.")]
    async fn cleanup_cache(&self) -> Result<CallToolResult, McpError> {
        cleanup_impl(&self.worker).await
    }

    #[tool(description = "Look up a cached response by URL across all partitions.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for PocketServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "pocketsw".into(),
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
