//! The five caching strategies.
//!
//! Counter rules: a cache lookup that finds an entry records a hit; a lookup
//! that finds nothing records a miss; every awaited network fetch records a
//! network request. Background revalidations are not counted.

use url::Url;

use pocketsw_core::{Error, Snapshot, Strategy};

use super::{Dispatcher, ResponseSource};

type Outcome = Result<(Snapshot, ResponseSource), Error>;

impl Dispatcher {
    /// Run `strategy` for an intercepted URL.
    pub async fn execute(&self, strategy: Strategy, url: &Url) -> Outcome {
        match strategy {
            Strategy::CacheFirst => self.cache_first(url).await,
            Strategy::NetworkFirst => self.network_first(url).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(url).await,
            Strategy::CacheOnly => self.cache_only(url).await,
            Strategy::NetworkOnly => self.network_only(url).await,
        }
    }

    async fn cache_first(&self, url: &Url) -> Outcome {
        if let Some(hit) = self.lookup(url).await {
            self.metrics.record_hit();
            return Ok((hit, ResponseSource::Cache));
        }

        self.metrics.record_miss();
        self.metrics.record_network_request();
        let response = self.network.fetch(url).await?;
        self.persist(&response).await;
        Ok((response, ResponseSource::Network))
    }

    async fn network_first(&self, url: &Url) -> Outcome {
        self.metrics.record_network_request();
        match self.network.fetch(url).await {
            Ok(response) => {
                self.persist(&response).await;
                Ok((response, ResponseSource::Network))
            }
            Err(network_err) => {
                tracing::debug!(url = %url, error = %network_err, "network failed; trying cache");
                match self.lookup(url).await {
                    Some(hit) => {
                        self.metrics.record_hit();
                        Ok((hit, ResponseSource::Cache))
                    }
                    None => {
                        self.metrics.record_miss();
                        Err(network_err)
                    }
                }
            }
        }
    }

    async fn stale_while_revalidate(&self, url: &Url) -> Outcome {
        if let Some(hit) = self.lookup(url).await {
            self.metrics.record_hit();
            self.revalidate(url);
            return Ok((hit, ResponseSource::Cache));
        }

        self.metrics.record_miss();
        self.metrics.record_network_request();
        let response = self.network.fetch(url).await?;
        self.persist(&response).await;
        Ok((response, ResponseSource::Network))
    }

    async fn cache_only(&self, url: &Url) -> Outcome {
        match self.lookup(url).await {
            Some(hit) => {
                self.metrics.record_hit();
                Ok((hit, ResponseSource::Cache))
            }
            None => {
                self.metrics.record_miss();
                Err(Error::CacheMiss(url.to_string()))
            }
        }
    }

    async fn network_only(&self, url: &Url) -> Outcome {
        self.metrics.record_network_request();
        let response = self.network.fetch(url).await?;
        Ok((response, ResponseSource::Network))
    }

    /// Refresh `url` in a detached task.
    ///
    /// The result is only logged. When `max_revalidations` refreshes are
    /// already running the refresh is skipped rather than queued.
    fn revalidate(&self, url: &Url) {
        let Ok(permit) = self.revalidations.clone().try_acquire_owned() else {
            tracing::debug!(url = %url, "revalidation limit reached; skipping refresh");
            return;
        };

        let network = self.network.clone();
        let cache = self.cache.clone();
        let partition = self.dynamic_partition.clone();
        let url = url.clone();

        tokio::spawn(async move {
            let _permit = permit;
            match network.fetch(&url).await {
                Ok(response) if response.is_success() => {
                    if let Err(e) = cache.put_snapshot(&partition, &response).await {
                        tracing::warn!(url = %url, error = %e, "failed to store revalidated response");
                    } else {
                        tracing::trace!(url = %url, "revalidated cache entry");
                    }
                }
                Ok(response) => {
                    tracing::debug!(url = %url, status = response.status, "revalidation returned non-success; keeping entry");
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "background revalidation failed");
                }
            }
        });
    }
}
