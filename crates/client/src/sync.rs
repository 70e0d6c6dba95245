//! Durable FIFO of deferred requests, replayed on a sync trigger.
//!
//! Tasks are stored as JSON under `sync/{id:020}` so that the key order of
//! the durable store is the enqueue order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cachewarden_core::{DurableStore, Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::fetch::Network;
use crate::request::{Destination, RequestDescriptor};

const KEY_PREFIX: &str = "sync/";

fn task_key(id: u64) -> String {
    format!("{KEY_PREFIX}{id:020}")
}

/// A request waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSyncTask {
    pub id: u64,
    pub url: String,
    pub destination: Destination,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Counts from one drain of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SyncReport {
    pub replayed: usize,
    pub failed: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another drain is still running.
    AlreadyRunning,
    /// The tag is not the configured sync tag; nothing was done.
    UnknownTag,
}

/// Clears the running flag when a drain ends, including on early return.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BackgroundSyncQueue {
    store: Arc<dyn DurableStore>,
    network: Arc<dyn Network>,
    tag: String,
    next_id: Mutex<Option<u64>>,
    running: AtomicBool,
}

impl BackgroundSyncQueue {
    pub fn new(store: Arc<dyn DurableStore>, network: Arc<dyn Network>, tag: impl Into<String>) -> Self {
        Self { store, network, tag: tag.into(), next_id: Mutex::new(None), running: AtomicBool::new(false) }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Persist `request` for later replay and return its task id.
    pub async fn enqueue(&self, request: &RequestDescriptor) -> Result<u64, Error> {
        let mut next_id = self.next_id.lock().await;
        let id = match *next_id {
            Some(id) => id,
            None => self.pending().await?.last().map(|t| t.id + 1).unwrap_or(1),
        };

        let task = PendingSyncTask {
            id,
            url: request.url.to_string(),
            destination: request.destination,
            enqueued_at: Utc::now(),
            attempts: 0,
        };
        self.store.put(&task_key(id), &serde_json::to_string(&task)?).await?;
        *next_id = Some(id + 1);

        tracing::info!(id, url = %task.url, "queued request for background sync");
        Ok(id)
    }

    /// Pending tasks in enqueue order.
    pub async fn pending(&self) -> Result<Vec<PendingSyncTask>, Error> {
        let mut tasks = Vec::new();
        for (key, value) in self.store.list_all().await? {
            if !key.starts_with(KEY_PREFIX) {
                continue;
            }
            match serde_json::from_str::<PendingSyncTask>(&value) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(%key, error = %e, "skipping unreadable sync task"),
            }
        }
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    /// Drain the queue if `tag` is the sync tag.
    ///
    /// Tasks are replayed one at a time in FIFO order. A replay that yields a
    /// response below 500 completes the task; anything else bumps its attempt
    /// count and moves on to the next task. Storage errors while settling a
    /// task are logged and leave that task queued; the drain continues.
    pub async fn trigger(&self, tag: &str) -> Result<SyncOutcome, Error> {
        if tag != self.tag {
            tracing::debug!(tag, "ignoring sync trigger with unknown tag");
            return Ok(SyncOutcome::UnknownTag);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(SyncOutcome::AlreadyRunning);
        }
        let _guard = DrainGuard(&self.running);

        let mut report = SyncReport::default();
        for task in self.pending().await? {
            let id = task.id;
            if self.replay(&task).await {
                report.replayed += 1;
                if let Err(e) = self.store.delete(&task_key(id)).await {
                    tracing::warn!(id, error = %e, "replayed sync task could not be removed");
                    report.remaining += 1;
                }
            } else {
                report.failed += 1;
                report.remaining += 1;
                if let Err(e) = self.record_attempt(task).await {
                    tracing::warn!(id, error = %e, "failed to record sync attempt");
                }
            }
        }

        tracing::info!(
            replayed = report.replayed,
            failed = report.failed,
            remaining = report.remaining,
            "background sync finished"
        );
        Ok(SyncOutcome::Completed(report))
    }

    async fn record_attempt(&self, task: PendingSyncTask) -> Result<(), Error> {
        let retried = PendingSyncTask { attempts: task.attempts + 1, ..task };
        self.store.put(&task_key(retried.id), &serde_json::to_string(&retried)?).await
    }

    async fn replay(&self, task: &PendingSyncTask) -> bool {
        let url = match Url::parse(&task.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(id = task.id, url = %task.url, error = %e, "sync task has invalid URL");
                return false;
            }
        };
        let request = RequestDescriptor::new("GET", url, task.destination);
        match self.network.fetch(&request).await {
            Ok(response) if response.status < 500 => true,
            Ok(response) => {
                tracing::warn!(id = task.id, url = %task.url, status = response.status, "sync replay rejected");
                false
            }
            Err(e) => {
                tracing::warn!(id = task.id, url = %task.url, attempts = task.attempts + 1, error = %e, "sync replay failed");
                false
            }
        }
    }
}
