//! Test fixtures shared by the tool modules.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use pocketsw_client::{Method, Network, ServiceWorker};
use pocketsw_core::{AppConfig, CacheDb, Error, Snapshot};
use rmcp::model::CallToolResult;
use serde::de::DeserializeOwned;
use url::Url;

/// Fixed set of pages; anything else answers 404.
pub struct SiteNetwork {
    pages: HashMap<String, (u16, String)>,
    calls: AtomicUsize,
}

impl SiteNetwork {
    pub fn new(pages: &[(&str, u16, &str)]) -> Self {
        let pages = pages
            .iter()
            .map(|(path, status, body)| (format!("http://localhost:8080{path}"), (*status, body.to_string())))
            .collect();
        Self { pages, calls: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for SiteNetwork {
    async fn send(&self, _method: Method, url: &Url) -> Result<Snapshot, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let (status, body) = self.pages.get(url.as_str()).cloned().unwrap_or((404, "Not Found".into()));
        Ok(Snapshot::new(url.as_str(), status)
            .with_header("date", date)
            .with_header("content-type", "text/plain")
            .with_body(body))
    }
}

/// An installed and activated worker serving `pages`, with `/` as its only
/// critical resource.
pub async fn active_worker(pages: &[(&str, u16, &str)]) -> ServiceWorker {
    active_worker_on(Arc::new(SiteNetwork::new(pages))).await
}

/// Same as [`active_worker`], keeping a handle on the network.
pub async fn active_worker_on(network: Arc<SiteNetwork>) -> ServiceWorker {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let config = AppConfig {
        critical_resources: vec!["/".into()],
        non_critical_resources: vec![],
        ..Default::default()
    };

    let worker = ServiceWorker::new(&config, cache, network).unwrap();
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    worker
}

/// Decode the JSON text content of a tool result.
pub fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
