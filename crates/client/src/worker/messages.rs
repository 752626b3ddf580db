//! Out-of-band control commands.
//!
//! Commands arrive as JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "GET_METRICS"}
//! {"type": "CLEAR_CACHE"}
//! {"type": "PREFETCH_RESOURCES", "urls": ["/a.png"]}
//! ```

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use pocketsw_core::{CacheDb, Error, MetricsSnapshot};

use super::ServiceWorker;
use crate::fetch::{Network, resolve};

const PREFETCH_CONCURRENCY: usize = 4;

/// A control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    GetMetrics,
    ClearCache,
    PrefetchResources { urls: Vec<String> },
}

/// Reply to `CLEAR_CACHE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClearReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-URL prefetch outcome. `error` is `null` on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PrefetchResult {
    pub url: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Reply to `PREFETCH_RESOURCES`, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PrefetchReply {
    pub results: Vec<PrefetchResult>,
}

/// Reply to any command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CommandReply {
    Metrics(MetricsSnapshot),
    Cleared(ClearReply),
    Prefetched(PrefetchReply),
}

/// Fetch one resource and store it if the response is 2xx.
pub(crate) async fn add_resource(
    cache: &CacheDb, network: &dyn Network, origin: &Url, partition: &str, resource: &str,
) -> Result<(), Error> {
    let url = resolve(origin, resource).map_err(|e| Error::InvalidUrl(format!("{resource}: {e}")))?;
    let response = network.fetch(&url).await?;

    if !response.is_success() {
        return Err(Error::HttpError(format!("bad response status {} for {url}", response.status)));
    }

    cache.put_snapshot(partition, &response).await
}

impl ServiceWorker {
    /// Handle one control command.
    pub async fn handle_message(&self, command: Command) -> CommandReply {
        match command {
            Command::GetMetrics => CommandReply::Metrics(self.metrics()),
            Command::ClearCache => CommandReply::Cleared(self.clear_all().await),
            Command::PrefetchResources { urls } => CommandReply::Prefetched(self.prefetch(urls).await),
        }
    }

    /// Delete every partition, including ones from other versions.
    pub async fn clear_all(&self) -> ClearReply {
        let result = async {
            let mut deleted = 0;
            for name in self.cache.partition_names().await? {
                if self.cache.delete_partition(&name).await? {
                    deleted += 1;
                }
            }
            Ok::<_, Error>(deleted)
        }
        .await;

        match result {
            Ok(deleted) => {
                tracing::info!(deleted, "cleared all cache partitions");
                ClearReply { success: true, error: None }
            }
            Err(e) => {
                self.metrics.record_error();
                tracing::error!(error = %e, "failed to clear cache");
                ClearReply { success: false, error: Some(e.to_string()) }
            }
        }
    }

    /// Fetch `urls` into the dynamic partition, at most four at a time.
    pub async fn prefetch(&self, urls: Vec<String>) -> PrefetchReply {
        let semaphore = Arc::new(Semaphore::new(PREFETCH_CONCURRENCY));
        let mut join_set = JoinSet::new();

        for (index, url) in urls.iter().enumerate() {
            let semaphore = semaphore.clone();
            let cache = self.cache.clone();
            let network = self.network.clone();
            let origin = self.origin.clone();
            let partition = self.dynamic_partition.clone();
            let url = url.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = add_resource(&cache, network.as_ref(), &origin, &partition, &url).await;
                (index, result)
            });
        }

        let mut results: Vec<PrefetchResult> = urls
            .into_iter()
            .map(|url| PrefetchResult { url, success: false, error: Some("prefetch task aborted".into()) })
            .collect();

        while let Some(joined) = join_set.join_next().await {
            let (index, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.metrics.record_error();
                    tracing::error!(error = %e, "prefetch task panicked");
                    continue;
                }
            };

            let item = &mut results[index];
            match result {
                Ok(()) => {
                    item.success = true;
                    item.error = None;
                }
                Err(e) => {
                    self.metrics.record_error();
                    tracing::warn!(url = %item.url, error = %e, "prefetch failed");
                    item.error = Some(e.to_string());
                }
            }
        }

        PrefetchReply { results }
    }
}
