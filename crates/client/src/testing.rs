//! Scripted network double shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cachewarden_core::{AppConfig, CacheDb, CachedResponse, Error};
use tokio::sync::Notify;

use crate::fetch::Network;
use crate::request::RequestDescriptor;

/// Network that answers from a per-URL script and counts calls.
///
/// Unscripted URLs fail with `Error::Network`. When gated, every fetch waits
/// for [`MockNetwork::release`] before answering.
#[derive(Default)]
pub struct MockNetwork {
    responses: Mutex<HashMap<String, Result<CachedResponse, String>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self { gate: Some(Arc::new(Notify::new())), ..Self::default() }
    }

    pub fn respond(&self, url: &str, response: CachedResponse) {
        self.responses.lock().unwrap().insert(url.to_string(), Ok(response));
    }

    pub fn fail(&self, url: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Err("connection refused".to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<CachedResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let scripted = self.responses.lock().unwrap().get(request.url.as_str()).cloned();
        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(msg)) => Err(Error::Network(msg)),
            None => Err(Error::Network(format!("no route to {}", request.url))),
        }
    }
}

pub fn html(body: &str) -> CachedResponse {
    CachedResponse::ok("text/html", body)
}

pub fn test_config() -> AppConfig {
    AppConfig { metrics_sample_rate: 0.0, ..Default::default() }
}

pub async fn memory_db() -> CacheDb {
    CacheDb::open_in_memory().await.unwrap()
}
