//! fetch_resource tool implementation.
//!
//! Sends a request through the worker exactly as a page would and reports
//! which strategy answered it and from where.

use std::collections::BTreeMap;

use pocketsw_client::{Method, ResourceRequest, ResponseSource, ServiceWorker};
use pocketsw_core::Strategy;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::json_result;

/// Input parameters for fetch_resource tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchResourceParams {
    /// Absolute URL or path relative to the site origin.
    pub url: String,

    /// HTTP method (default: GET). Only GET is intercepted; anything else
    /// goes to the network uncached.
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for fetch_resource tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchResourceOutput {
    /// Resolved URL.
    pub url: String,
    /// HTTP status of the served response (408 when synthesized).
    pub status: u16,
    /// Where the response came from.
    pub source: ResponseSource,
    /// Strategy that handled the request; absent for pass-through.
    pub strategy: Option<Strategy>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
}

/// Implementation of the fetch_resource tool.
pub async fn fetch_impl(worker: &ServiceWorker, params: FetchResourceParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let method = Method::from_bytes(params.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|e| ToolError::InvalidInput(format!("invalid method {:?}: {e}", params.method)))?;

    let served = worker.fetch(&ResourceRequest::new(method, params.url)).await?;
    let response = served.response;

    let output = FetchResourceOutput {
        url: response.url.clone(),
        status: response.status,
        source: served.source,
        strategy: served.strategy,
        content_type: response.content_type().map(str::to_string),
        body: response.body_text(),
        body_bytes: response.body.len(),
        headers: response.headers,
    };

    json_result(&output)
}
