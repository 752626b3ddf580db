//! Worker lifecycle: install, activate, serve, clean up.
//!
//! ```text
//! Parsed --install--> Installing --ok--> Installed --activate--> Activated
//!                         |
//!                         +--error--> Redundant
//! ```
//!
//! Install pre-caches the critical resources (all or nothing) into the
//! static partition and the non-critical resources (best effort) into the
//! dynamic one. Activation deletes partitions left over from other versions.
//! Only an activated worker intercepts requests.

pub mod messages;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use pocketsw_core::{AppConfig, CacheDb, Error, Metrics, MetricsSnapshot};

use crate::dispatch::{Dispatch, Dispatcher, ResourceRequest, ResponseSource, Served};
use crate::fetch::{Network, resolve};

pub use messages::{ClearReply, Command, CommandReply, PrefetchReply, PrefetchResult};

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activated,
    /// Install failed; the worker never serves.
    Redundant,
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InstallReport {
    /// Entries written to the static partition.
    pub precached: usize,
    /// Non-critical resources written to the dynamic partition.
    pub optional_cached: usize,
    /// Non-critical resources that could not be cached.
    pub optional_failed: Vec<String>,
}

/// The cache worker: lifecycle, dispatch and control commands.
pub struct ServiceWorker {
    cache: CacheDb,
    network: Arc<dyn Network>,
    metrics: Arc<Metrics>,
    dispatcher: Dispatcher,
    origin: Url,
    static_partition: String,
    dynamic_partition: String,
    critical_resources: Vec<String>,
    non_critical_resources: Vec<String>,
    max_age: chrono::Duration,
    state: RwLock<WorkerState>,
}

impl ServiceWorker {
    /// Build a worker from validated configuration.
    pub fn new(config: &AppConfig, cache: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Dispatcher::from_config(config, cache.clone(), network.clone(), metrics.clone())?;

        Ok(Self {
            origin: dispatcher.origin().clone(),
            cache,
            network,
            metrics,
            dispatcher,
            static_partition: config.static_partition(),
            dynamic_partition: config.dynamic_partition(),
            critical_resources: config.critical_resources.clone(),
            non_critical_resources: config.non_critical_resources.clone(),
            max_age: config.max_age(),
            state: RwLock::new(WorkerState::Parsed),
        })
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn cache(&self) -> &CacheDb {
        &self.cache
    }

    pub fn static_partition(&self) -> &str {
        &self.static_partition
    }

    pub fn dynamic_partition(&self) -> &str {
        &self.dynamic_partition
    }

    /// Age past which cleanup evicts dynamic entries.
    pub fn max_age(&self) -> chrono::Duration {
        self.max_age
    }

    /// Resolve a resource path or URL against the site origin.
    pub fn resolve(&self, input: &str) -> Result<Url, Error> {
        resolve(&self.origin, input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
    }

    /// Pre-cache critical and non-critical resources.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` if any critical resource cannot be
    /// fetched with a 2xx status; the static partition is left untouched and
    /// the worker becomes redundant.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.set_state(WorkerState::Installing).await;
        tracing::info!(partition = %self.static_partition, "installing worker");

        match self.precache().await {
            Ok(report) => {
                self.set_state(WorkerState::Installed).await;
                tracing::info!(
                    precached = report.precached,
                    optional_cached = report.optional_cached,
                    optional_failed = report.optional_failed.len(),
                    "worker installed; skipping wait"
                );
                Ok(report)
            }
            Err(e) => {
                self.metrics.record_error();
                self.set_state(WorkerState::Redundant).await;
                tracing::error!(error = %e, "worker install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<InstallReport, Error> {
        let mut critical = Vec::with_capacity(self.critical_resources.len());
        for path in &self.critical_resources {
            let url = self.resolve(path).map_err(|e| Error::InstallFailed(e.to_string()))?;
            let response = self
                .network
                .fetch(&url)
                .await
                .map_err(|e| Error::InstallFailed(format!("{path}: {e}")))?;
            if !response.is_success() {
                return Err(Error::InstallFailed(format!("{path}: status {}", response.status)));
            }
            critical.push(response);
        }

        let precached = critical.len();
        self.cache.open_partition(&self.static_partition).await?;
        self.cache.put_snapshots(&self.static_partition, critical).await?;

        self.cache.open_partition(&self.dynamic_partition).await?;
        let mut optional_cached = 0;
        let mut optional_failed = Vec::new();
        for path in &self.non_critical_resources {
            match messages::add_resource(&self.cache, self.network.as_ref(), &self.origin, &self.dynamic_partition, path)
                .await
            {
                Ok(()) => optional_cached += 1,
                Err(e) => {
                    tracing::warn!(resource = %path, error = %e, "failed to cache non-critical resource");
                    optional_failed.push(path.clone());
                }
            }
        }

        Ok(InstallReport { precached, optional_cached, optional_failed })
    }

    /// Delete partitions from other versions and start intercepting.
    ///
    /// Returns the names of the deleted partitions.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the worker is installed (or
    /// already active).
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let state = self.state().await;
        if !matches!(state, WorkerState::Installed | WorkerState::Activated) {
            return Err(Error::InvalidState(format!("cannot activate a worker in state {state:?}")));
        }

        let keep = [self.static_partition.as_str(), self.dynamic_partition.as_str()];
        let deleted = self.cache.retain_partitions(&keep).await.inspect_err(|e| {
            self.metrics.record_error();
            tracing::error!(error = %e, "activation cleanup failed");
        })?;

        for name in &deleted {
            tracing::info!(partition = %name, "deleted outdated cache partition");
        }

        self.set_state(WorkerState::Activated).await;
        tracing::info!("worker activated; claiming clients");
        Ok(deleted)
    }

    /// Serve a request.
    ///
    /// Requests the worker does not intercept (non-GET, non-http, or any
    /// request before activation) go straight to the network.
    pub async fn fetch(&self, request: &ResourceRequest) -> Result<Served, Error> {
        if self.state().await == WorkerState::Activated
            && let Dispatch::Served(served) = self.dispatcher.handle(request).await
        {
            return Ok(served);
        }

        self.passthrough(request).await
    }

    /// Forward a request untouched. The response is never cached.
    async fn passthrough(&self, request: &ResourceRequest) -> Result<Served, Error> {
        let url = self.resolve(&request.url)?;
        tracing::trace!(method = %request.method, url = %url, "passing request through");
        let response = self.network.send(request.method.clone(), &url).await?;
        Ok(Served { response, source: ResponseSource::Passthrough, strategy: None })
    }

    /// Run one eviction pass over the dynamic partition.
    pub async fn cleanup(&self) -> Result<u64, Error> {
        self.cleanup_at(Utc::now()).await
    }

    /// Eviction pass with an explicit clock.
    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        match self.cache.purge_stale_snapshots(&self.dynamic_partition, self.max_age, now).await {
            Ok(deleted) => {
                tracing::info!(partition = %self.dynamic_partition, deleted, "cache cleanup finished");
                Ok(deleted)
            }
            Err(e) => {
                self.metrics.record_error();
                tracing::error!(error = %e, "cache cleanup failed");
                Err(e)
            }
        }
    }

    /// Wait for background revalidations; used on shutdown.
    pub async fn drain(&self) {
        self.dispatcher.wait_for_revalidations().await;
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        tracing::debug!(from = ?*state, to = ?next, "worker state transition");
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pocketsw_core::Snapshot;
    use reqwest::Method;

    use super::*;
    use crate::testing::StubNetwork;

    const ORIGIN: &str = "http://localhost:8080";

    fn config(critical: &[&str], optional: &[&str]) -> AppConfig {
        AppConfig {
            origin: ORIGIN.into(),
            critical_resources: critical.iter().map(|s| s.to_string()).collect(),
            non_critical_resources: optional.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn worker(config: &AppConfig, network: StubNetwork) -> (ServiceWorker, Arc<StubNetwork>) {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(network);
        let worker = ServiceWorker::new(config, cache, network.clone()).unwrap();
        (worker, network)
    }

    fn site() -> StubNetwork {
        StubNetwork::new()
            .respond("http://localhost:8080/", 200, "home")
            .respond("http://localhost:8080/index.html", 200, "index")
            .respond("http://localhost:8080/hero.webp", 200, "image")
    }

    fn http_date(at: DateTime<Utc>) -> String {
        at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    #[tokio::test]
    async fn test_install_populates_static_partition_exactly() {
        let config = config(&["/", "/index.html"], &[]);
        let (worker, _) = worker(&config, site()).await;

        let report = worker.install().await.unwrap();

        assert_eq!(report.precached, 2);
        assert_eq!(worker.state().await, WorkerState::Installed);
        assert_eq!(
            worker.cache().list_urls(worker.static_partition()).await.unwrap(),
            vec!["http://localhost:8080/", "http://localhost:8080/index.html"]
        );
    }

    #[tokio::test]
    async fn test_install_fails_when_a_critical_resource_fails() {
        let config = config(&["/", "/missing.html"], &[]);
        let (worker, _) = worker(&config, site()).await;

        let result = worker.install().await;

        assert!(matches!(result, Err(Error::InstallFailed(msg)) if msg.contains("/missing.html")));
        assert_eq!(worker.state().await, WorkerState::Redundant);
        assert_eq!(worker.cache().count_snapshots(worker.static_partition()).await.unwrap(), 0);
        assert_eq!(worker.metrics().errors, 1);
        assert!(worker.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_install_tolerates_non_critical_failures() {
        let config = config(&["/"], &["/hero.webp", "/broken.woff2"]);
        let (worker, _) = worker(&config, site().fail("http://localhost:8080/broken.woff2", "reset")).await;

        let report = worker.install().await.unwrap();

        assert_eq!(report.optional_cached, 1);
        assert_eq!(report.optional_failed, vec!["/broken.woff2"]);
        assert_eq!(
            worker.cache().list_urls(worker.dynamic_partition()).await.unwrap(),
            vec!["http://localhost:8080/hero.webp"]
        );
    }

    #[tokio::test]
    async fn test_activate_deletes_partitions_from_other_versions() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let network: Arc<dyn Network> = Arc::new(site());

        let v1 = ServiceWorker::new(&config(&["/"], &["/hero.webp"]), cache.clone(), network.clone()).unwrap();
        v1.install().await.unwrap();
        v1.activate().await.unwrap();
        cache.open_partition("unrelated-leftover").await.unwrap();

        let v2_config = AppConfig { cache_version: "v2".into(), ..config(&["/"], &[]) };
        let v2 = ServiceWorker::new(&v2_config, cache.clone(), network).unwrap();
        v2.install().await.unwrap();
        let mut deleted = v2.activate().await.unwrap();
        deleted.sort();

        assert_eq!(deleted, vec!["pocketgnu-dynamic-v1", "pocketgnu-static-v1", "unrelated-leftover"]);
        assert_eq!(cache.partition_names().await.unwrap(), vec!["pocketgnu-static-v2", "pocketgnu-dynamic-v2"]);
        assert_eq!(v2.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let (worker, _) = worker(&config(&["/"], &[]), site()).await;
        assert!(matches!(worker.activate().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through() {
        let (worker, network) = worker(&config(&["/"], &[]), site()).await;

        let served = worker.fetch(&ResourceRequest::get("/hero.webp")).await.unwrap();

        assert_eq!(served.source, ResponseSource::Passthrough);
        assert_eq!(served.strategy, None);
        assert_eq!(network.call_count(), 1);
        assert_eq!(worker.metrics(), MetricsSnapshot::default());
    }

    #[tokio::test]
    async fn test_fetch_after_activation_serves_precached_entry() {
        let (worker, network) = worker(&config(&["/", "/index.html"], &[]), site()).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        network.set_offline(true);

        let served = worker.fetch(&ResourceRequest::get("/index.html")).await.unwrap();

        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.body_text(), "index");
        assert_eq!(served.strategy, Some(pocketsw_core::Strategy::NetworkFirst));
    }

    #[tokio::test]
    async fn test_fetch_non_get_goes_to_network_uncached() {
        let site = site().respond("http://localhost:8080/api/subscribe", 201, "created");
        let (worker, network) = worker(&config(&["/"], &[]), site).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        let calls_before = network.call_count();

        let served = worker.fetch(&ResourceRequest::new(Method::POST, "/api/subscribe")).await.unwrap();

        assert_eq!(served.source, ResponseSource::Passthrough);
        assert_eq!(served.strategy, None);
        assert_eq!(served.response.status, 201);
        assert_eq!(network.call_count(), calls_before + 1);
        assert_eq!(network.methods().last(), Some(&Method::POST));
        assert_eq!(worker.cache().count_snapshots(worker.dynamic_partition()).await.unwrap(), 0);
        assert_eq!(worker.metrics(), MetricsSnapshot::default());
    }

    #[tokio::test]
    async fn test_install_fails_on_critical_transport_error() {
        let config = config(&["/", "/index.html"], &[]);
        let (worker, _) = worker(&config, site().fail("http://localhost:8080/index.html", "connection refused")).await;

        let result = worker.install().await;

        assert!(matches!(result, Err(Error::InstallFailed(msg)) if msg.contains("connection refused")));
        assert_eq!(worker.state().await, WorkerState::Redundant);
        assert!(worker.cache().list_urls(worker.static_partition()).await.unwrap().is_empty());
        assert_eq!(worker.metrics().errors, 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_week_old_entries_only() {
        let (worker, _) = worker(&config(&["/"], &[]), site()).await;
        worker.install().await.unwrap();
        let now = Utc::now();

        let dynamic = worker.dynamic_partition().to_string();
        let old = Snapshot::new("http://localhost:8080/old.png", 200).with_header("date", http_date(now - Duration::days(8)));
        let recent =
            Snapshot::new("http://localhost:8080/recent.png", 200).with_header("date", http_date(now - Duration::days(6)));
        worker.cache().put_snapshot(&dynamic, &old).await.unwrap();
        worker.cache().put_snapshot(&dynamic, &recent).await.unwrap();

        let deleted = worker.cleanup_at(now).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(worker.cache().get_snapshot(&dynamic, &old.url).await.unwrap().is_none());
        assert!(worker.cache().get_snapshot(&dynamic, &recent.url).await.unwrap().is_some());
    }
}
