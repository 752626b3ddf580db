//! Request interception and strategy dispatch.
//!
//! The [`Dispatcher`] decides, per GET request, where a response comes from
//! and whether it is persisted:
//!
//! - non-GET and non-http(s) requests pass through untouched
//! - everything else is classified by the [`RouteTable`] and executed by one
//!   of the five [`Strategy`] variants (see `strategies.rs`)
//! - any failure escaping a strategy becomes a synthetic 408 response and is
//!   counted as an error
//!
//! Persisted responses always land in the dynamic partition. Lookups search
//! every partition, static first.

mod strategies;

use std::sync::Arc;

use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use url::Url;

use pocketsw_core::{AppConfig, CacheDb, Error, Metrics, RouteTable, Snapshot, Strategy};

use crate::fetch::{Network, UrlError, resolve};

/// An outgoing resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub method: Method,
    pub url: String,
}

impl ResourceRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into() }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
    /// Generated locally after a failure.
    Synthetic,
    /// Fetched without interception.
    Passthrough,
}

/// A response chosen by the dispatcher.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Snapshot,
    pub source: ResponseSource,
    /// Strategy that produced the response; `None` for pass-through.
    pub strategy: Option<Strategy>,
}

/// Outcome of [`Dispatcher::handle`].
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Not intercepted; default network handling applies.
    Passthrough,
    Served(Served),
}

/// Strategy dispatcher over the partitioned cache.
pub struct Dispatcher {
    cache: CacheDb,
    network: Arc<dyn Network>,
    routes: RouteTable,
    origin: Url,
    dynamic_partition: String,
    metrics: Arc<Metrics>,
    revalidations: Arc<Semaphore>,
    max_revalidations: u32,
}

impl Dispatcher {
    /// Build a dispatcher from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin does not parse or a route pattern does not compile.
    pub fn from_config(
        config: &AppConfig, cache: CacheDb, network: Arc<dyn Network>, metrics: Arc<Metrics>,
    ) -> Result<Self, Error> {
        let routes = RouteTable::compile(&config.routes)?;
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        let max_revalidations = u32::try_from(config.max_revalidations.max(1)).unwrap_or(u32::MAX);

        Ok(Self {
            cache,
            network,
            routes,
            origin,
            dynamic_partition: config.dynamic_partition(),
            metrics,
            revalidations: Arc::new(Semaphore::new(max_revalidations as usize)),
            max_revalidations,
        })
    }

    /// Strategy assigned to a URL.
    pub fn classify(&self, url: &str) -> Strategy {
        self.routes.classify(url)
    }

    /// Resolve the request URL if the dispatcher intercepts it.
    pub fn intercept(&self, request: &ResourceRequest) -> Option<Url> {
        if request.method != Method::GET {
            return None;
        }

        match resolve(&self.origin, &request.url) {
            Ok(url) => Some(url),
            Err(UrlError::UnsupportedScheme(scheme)) => {
                tracing::trace!(url = %request.url, scheme = %scheme, "ignoring non-http request");
                None
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "ignoring unresolvable request");
                None
            }
        }
    }

    /// Handle one request.
    ///
    /// Never fails: strategy errors are counted and converted into a
    /// synthetic 408 response.
    pub async fn handle(&self, request: &ResourceRequest) -> Dispatch {
        let Some(url) = self.intercept(request) else {
            return Dispatch::Passthrough;
        };

        let strategy = self.classify(url.as_str());

        match self.execute(strategy, &url).await {
            Ok((response, source)) => Dispatch::Served(Served { response, source, strategy: Some(strategy) }),
            Err(e) => {
                self.metrics.record_error();
                tracing::error!(url = %url, %strategy, error = %e, "request handling failed; serving 408");
                Dispatch::Served(Served {
                    response: Snapshot::request_timeout(url.as_str()),
                    source: ResponseSource::Synthetic,
                    strategy: Some(strategy),
                })
            }
        }
    }

    /// Wait until no background revalidation is in flight.
    pub async fn wait_for_revalidations(&self) {
        // All permits free means every detached refresh has finished.
        if let Ok(permits) = self.revalidations.acquire_many(self.max_revalidations).await {
            drop(permits);
        }
    }

    /// Number of background revalidations currently running.
    pub fn revalidations_in_flight(&self) -> usize {
        self.max_revalidations as usize - self.revalidations.available_permits()
    }

    pub fn dynamic_partition(&self) -> &str {
        &self.dynamic_partition
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Cache lookup across all partitions; read failures count as misses.
    async fn lookup(&self, url: &Url) -> Option<Snapshot> {
        match self.cache.match_snapshot(url.as_str()).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Write a 2xx response into the dynamic partition.
    ///
    /// Write failures are logged and never reach the caller.
    async fn persist(&self, response: &Snapshot) {
        if !response.is_success() {
            tracing::debug!(url = %response.url, status = response.status, "not caching non-success response");
            return;
        }

        if let Err(e) = self.cache.put_snapshot(&self.dynamic_partition, response).await {
            tracing::warn!(url = %response.url, error = %e, "failed to write dynamic cache entry");
        }
    }
}
