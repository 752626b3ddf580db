//! Scripted `Network` used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use pocketsw_core::{Error, Snapshot};
use url::Url;

use crate::fetch::Network;

enum Reply {
    Status(u16, String),
    Fail(String),
}

/// In-memory network: URLs answer with a scripted reply, unknown URLs 404,
/// and `offline()` makes every request fail.
#[derive(Default)]
pub struct StubNetwork {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    methods: Mutex<Vec<Method>>,
    offline: Mutex<bool>,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::Status(status, body.to_string()));
        self
    }

    pub fn fail(self, url: &str, message: &str) -> Self {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::Fail(message.to_string()));
        self
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.methods.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn send(&self, method: Method, url: &Url) -> Result<Snapshot, Error> {
        self.calls.lock().unwrap().push(url.to_string());
        self.methods.lock().unwrap().push(method);

        if *self.offline.lock().unwrap() {
            return Err(Error::HttpError("network error: offline".into()));
        }

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        match self.replies.lock().unwrap().get(url.as_str()) {
            Some(Reply::Status(status, body)) => Ok(Snapshot::new(url.as_str(), *status)
                .with_header("date", date)
                .with_header("content-type", "text/plain")
                .with_body(body.as_str())),
            Some(Reply::Fail(message)) => Err(Error::HttpError(format!("network error: {message}"))),
            None => Ok(Snapshot::new(url.as_str(), 404).with_header("date", date).with_body("Not Found")),
        }
    }
}
