//! The five fetch strategies.
//!
//! Only 2xx responses are stored, always into the dynamic generation. A
//! store write that fails after a successful fetch never fails the request:
//! it is logged and counted.

use std::sync::Arc;

use cachewarden_core::{CacheDb, CachedResponse, Error, RequestKey};

use super::{ResponseSource, Revalidator, Served, Strategy};
use crate::fetch::Network;
use crate::metrics::{MetricKind, Metrics};
use crate::request::RequestDescriptor;

/// Runs a chosen strategy against the cache store and the network.
#[derive(Clone)]
pub struct StrategyExecutor {
    db: CacheDb,
    network: Arc<dyn Network>,
    metrics: Arc<Metrics>,
    dynamic_cache: String,
    revalidator: Revalidator,
}

impl StrategyExecutor {
    pub fn new(
        db: CacheDb, network: Arc<dyn Network>, metrics: Arc<Metrics>, dynamic_cache: impl Into<String>,
        revalidator: Revalidator,
    ) -> Self {
        Self { db, network, metrics, dynamic_cache: dynamic_cache.into(), revalidator }
    }

    pub fn revalidator(&self) -> &Revalidator {
        &self.revalidator
    }

    /// Run `strategy` for `request`.
    ///
    /// # Errors
    ///
    /// Network failures with no cached copy, `Error::CacheMiss` for
    /// cache-only misses, and storage errors from cache reads.
    pub async fn execute(&self, strategy: Strategy, request: &RequestDescriptor) -> Result<Served, Error> {
        let key = request.key()?;
        let (source, response) = match strategy {
            Strategy::CacheFirst => self.cache_first(request, &key).await?,
            Strategy::NetworkFirst => self.network_first(request, &key).await?,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, &key).await?,
            Strategy::CacheOnly => self.cache_only(&key).await?,
            Strategy::NetworkOnly => (ResponseSource::Network, self.network.fetch(request).await?),
        };
        tracing::debug!(url = %request.url, %strategy, ?source, status = response.status, "served");
        Ok(Served { strategy, source, response })
    }

    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>, Error> {
        Ok(self.db.match_entry(key).await?.map(|entry| entry.response))
    }

    /// Fetch and store the response if it is 2xx.
    async fn fetch_and_store(&self, request: &RequestDescriptor, key: &RequestKey) -> Result<CachedResponse, Error> {
        let response = self.network.fetch(request).await?;
        if response.is_success()
            && let Err(e) = self.db.put_entry(&self.dynamic_cache, key, &response).await
        {
            tracing::warn!(url = %key.url(), cache = %self.dynamic_cache, error = %e, "cache write failed");
            self.metrics.record(MetricKind::StorageError).await;
        }
        Ok(response)
    }

    async fn cache_first(
        &self, request: &RequestDescriptor, key: &RequestKey,
    ) -> Result<(ResponseSource, CachedResponse), Error> {
        if let Some(cached) = self.lookup(key).await? {
            self.metrics.record(MetricKind::CacheHit).await;
            return Ok((ResponseSource::Cache, cached));
        }
        self.metrics.record(MetricKind::CacheMiss).await;
        let response = self.fetch_and_store(request, key).await?;
        Ok((ResponseSource::Network, response))
    }

    async fn network_first(
        &self, request: &RequestDescriptor, key: &RequestKey,
    ) -> Result<(ResponseSource, CachedResponse), Error> {
        self.metrics.record(MetricKind::NetworkRequest).await;
        let err = match self.fetch_and_store(request, key).await {
            Ok(response) => return Ok((ResponseSource::Network, response)),
            Err(e) if e.is_network() => e,
            Err(e) => return Err(e),
        };

        self.metrics.record(MetricKind::OfflineRequest).await;
        tracing::debug!(url = %request.url, error = %err, "network failed, trying cache");
        match self.lookup(key).await {
            Ok(Some(cached)) => Ok((ResponseSource::Cache, cached)),
            Ok(None) => Err(err),
            Err(lookup_err) => {
                tracing::warn!(url = %request.url, error = %lookup_err, "cache lookup failed");
                Err(err)
            }
        }
    }

    async fn stale_while_revalidate(
        &self, request: &RequestDescriptor, key: &RequestKey,
    ) -> Result<(ResponseSource, CachedResponse), Error> {
        if let Some(cached) = self.lookup(key).await? {
            let this = self.clone();
            let request = request.clone();
            let key = key.clone();
            self.revalidator.spawn(async move {
                if let Err(e) = this.fetch_and_store(&request, &key).await {
                    tracing::debug!(url = %request.url, error = %e, "background refresh failed");
                }
            });
            return Ok((ResponseSource::Cache, cached));
        }
        let response = self.fetch_and_store(request, key).await?;
        Ok((ResponseSource::Network, response))
    }

    async fn cache_only(&self, key: &RequestKey) -> Result<(ResponseSource, CachedResponse), Error> {
        match self.lookup(key).await? {
            Some(cached) => Ok((ResponseSource::Cache, cached)),
            None => Err(Error::CacheMiss(key.url().to_string())),
        }
    }
}
