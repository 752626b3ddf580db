//! cache_get tool implementation.
//!
//! Looks up a cached response by URL across all partitions.

use std::collections::BTreeMap;

use chrono::Utc;
use pocketsw_client::ServiceWorker;
use pocketsw_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL or path relative to the site origin.
    pub url: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// When the entry was written (RFC 3339).
    pub cached_at: Option<String>,
    /// Whether the next cleanup pass would evict the entry.
    pub expired: bool,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = worker.resolve(&params.url)?;
    let snapshot = worker
        .cache()
        .match_snapshot(url.as_str())
        .await?
        .ok_or_else(|| Error::CacheMiss(url.to_string()))?;

    let output = CacheGetOutput {
        expired: snapshot.is_expired(worker.max_age(), Utc::now()),
        body: snapshot.body_text(),
        url: snapshot.url,
        status: snapshot.status,
        headers: snapshot.headers,
        cached_at: snapshot.cached_at,
    };

    json_result(&output)
}
