//! Request metrics with sampled persistence.
//!
//! Counters live in memory and are authoritative for the process lifetime.
//! Each recorded event flushes the snapshot to the durable store with a small
//! probability, which bounds write amplification while still letting the
//! counters survive a restart approximately.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cachewarden_core::{DurableStore, Error};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Durable-store key holding the last flushed snapshot.
pub const METRICS_KEY: &str = "metrics/snapshot";

/// Event kinds tracked by [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    CacheHit,
    CacheMiss,
    NetworkRequest,
    OfflineRequest,
    /// A cache write failed after a successful fetch.
    StorageError,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub cache_hits: u64,
    #[serde(default)]
    pub cache_misses: u64,
    #[serde(default)]
    pub network_requests: u64,
    #[serde(default)]
    pub offline_requests: u64,
    #[serde(default)]
    pub storage_errors: u64,
}

/// Process-wide counters owned by the engine.
///
/// A fresh instance starts at zero; [`Metrics::restore`] raises it to a
/// previously persisted snapshot. There is no reset: counters never decrease.
pub struct Metrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    network_requests: AtomicU64,
    offline_requests: AtomicU64,
    storage_errors: AtomicU64,
    sample_rate: f64,
    store: Option<Arc<dyn DurableStore>>,
}

impl Metrics {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            network_requests: AtomicU64::new(0),
            offline_requests: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            sample_rate: sample_rate.clamp(0.0, 1.0),
            store: None,
        }
    }

    /// Persist snapshots to `store`.
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn counter(&self, kind: MetricKind) -> &AtomicU64 {
        match kind {
            MetricKind::CacheHit => &self.cache_hits,
            MetricKind::CacheMiss => &self.cache_misses,
            MetricKind::NetworkRequest => &self.network_requests,
            MetricKind::OfflineRequest => &self.offline_requests,
            MetricKind::StorageError => &self.storage_errors,
        }
    }

    /// Increment one counter, occasionally flushing the snapshot.
    pub async fn record(&self, kind: MetricKind) {
        self.counter(kind).fetch_add(1, Ordering::Relaxed);

        let sampled = self.sample_rate > 0.0 && rand::thread_rng().gen_bool(self.sample_rate);
        if sampled && let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "failed to persist metrics snapshot");
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            network_requests: self.network_requests.load(Ordering::Relaxed),
            offline_requests: self.offline_requests.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
        }
    }

    /// Write the current snapshot to the durable store, if one is attached.
    pub async fn flush(&self) -> Result<(), Error> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let snapshot = self.snapshot();
        let json = serde_json::to_string(&snapshot)?;
        store.put(METRICS_KEY, &json).await?;
        tracing::debug!(?snapshot, "persisted metrics snapshot");
        Ok(())
    }

    /// Raise the counters to the persisted snapshot.
    ///
    /// Each counter becomes the maximum of its current and persisted value,
    /// so restoring never makes a counter go down. Returns the snapshot that
    /// was found, if any.
    pub async fn restore(&self) -> Result<Option<MetricsSnapshot>, Error> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(json) = store.get(METRICS_KEY).await? else {
            return Ok(None);
        };
        let stored: MetricsSnapshot = serde_json::from_str(&json)?;

        self.cache_hits.fetch_max(stored.cache_hits, Ordering::Relaxed);
        self.cache_misses.fetch_max(stored.cache_misses, Ordering::Relaxed);
        self.network_requests.fetch_max(stored.network_requests, Ordering::Relaxed);
        self.offline_requests.fetch_max(stored.offline_requests, Ordering::Relaxed);
        self.storage_errors.fetch_max(stored.storage_errors, Ordering::Relaxed);

        Ok(Some(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachewarden_core::MemoryStore;

    #[tokio::test]
    async fn test_record_increments_one_counter() {
        let metrics = Metrics::new(0.0);
        metrics.record(MetricKind::CacheHit).await;
        metrics.record(MetricKind::CacheHit).await;
        metrics.record(MetricKind::OfflineRequest).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.offline_requests, 1);
        assert_eq!(snapshot.cache_misses, 0);
        assert_eq!(snapshot.network_requests, 0);
    }

    #[tokio::test]
    async fn test_always_sampled_flushes() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Metrics::new(1.0).with_store(store.clone());

        metrics.record(MetricKind::NetworkRequest).await;

        let json = store.get(METRICS_KEY).await.unwrap().unwrap();
        let persisted: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(persisted.network_requests, 1);
    }

    #[tokio::test]
    async fn test_never_sampled_does_not_flush() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Metrics::new(0.0).with_store(store.clone());

        metrics.record(MetricKind::CacheMiss).await;

        assert!(store.get(METRICS_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_takes_maximum() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(METRICS_KEY, r#"{"cacheHits":5,"cacheMisses":1,"networkRequests":0,"offlineRequests":2}"#)
            .await
            .unwrap();

        let metrics = Metrics::new(0.0).with_store(store);
        metrics.record(MetricKind::CacheMiss).await;
        metrics.record(MetricKind::CacheMiss).await;
        metrics.record(MetricKind::CacheMiss).await;

        let restored = metrics.restore().await.unwrap().unwrap();
        assert_eq!(restored.cache_hits, 5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 5);
        assert_eq!(snapshot.cache_misses, 3);
        assert_eq!(snapshot.offline_requests, 2);
        assert_eq!(snapshot.storage_errors, 0);
    }

    #[tokio::test]
    async fn test_restore_without_store() {
        let metrics = Metrics::new(0.5);
        assert!(metrics.restore().await.unwrap().is_none());
        assert!(metrics.flush().await.is_ok());
    }

    #[test]
    fn test_snapshot_wire_format() {
        let snapshot = MetricsSnapshot { cache_hits: 1, ..Default::default() };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["cacheHits"], 1);
        assert_eq!(json["offlineRequests"], 0);
    }
}
