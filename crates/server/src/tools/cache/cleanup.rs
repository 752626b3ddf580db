//! cleanup_cache tool implementation.
//!
//! Runs the periodic eviction pass on demand.

use pocketsw_client::ServiceWorker;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Output from the cleanup_cache tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheCleanupOutput {
    /// Partition that was swept.
    pub partition: String,
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cleanup_cache tool.
pub async fn cleanup_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let deleted = worker.cleanup().await?;
    let output = CacheCleanupOutput { partition: worker.dynamic_partition().to_string(), deleted };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use pocketsw_core::Snapshot;

    use super::*;
    use crate::tools::testing::{active_worker, output};

    #[tokio::test]
    async fn test_cleanup_deletes_expired_dynamic_entries() {
        let worker = active_worker(&[("/", 200, "home")]).await;
        let stale = (Utc::now() - Duration::days(10)).format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let snapshot = Snapshot::new("http://localhost:8080/old.css", 200).with_header("date", stale);
        worker.cache().put_snapshot(worker.dynamic_partition(), &snapshot).await.unwrap();

        let result: CacheCleanupOutput = output(&cleanup_impl(&worker).await.unwrap());

        assert_eq!(result.deleted, 1);
        assert_eq!(result.partition, "pocketgnu-dynamic-v1");
        assert_eq!(worker.cache().count_snapshots(worker.static_partition()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_with_nothing_to_do() {
        let worker = active_worker(&[("/", 200, "home")]).await;
        let result: CacheCleanupOutput = output(&cleanup_impl(&worker).await.unwrap());
        assert_eq!(result.deleted, 0);
    }
}
