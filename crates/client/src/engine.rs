//! Request pipeline and version lifecycle.
//!
//! ### Pipeline
//! request → interception check → selector → executor → (on failure) fallback
//!
//! ### Lifecycle
//! - `install`: restore metrics, precache the static generation
//! - `activate`: delete every undeclared generation
//! - `skip_waiting`: activate an installed version immediately

use std::sync::Arc;

use cachewarden_core::{AppConfig, CacheDb, DurableStore, Error, Generations};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::fallback::FallbackResolver;
use crate::fetch::Network;
use crate::metrics::{MetricKind, Metrics, MetricsSnapshot};
use crate::notify::{ClickAction, LogNotifier, Notification, Notifier, push_notification, route_click};
use crate::request::{Destination, RequestDescriptor};
use crate::strategy::{ResponseSource, Revalidator, Served, StrategyExecutor, StrategySelector};
use crate::sync::{BackgroundSyncQueue, SyncOutcome};

/// Where the engine is in the version lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed; nothing precached yet.
    Parsed,
    Installed,
    Activated,
}

/// Result of offering a request to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not a GET over http(s); the transport handles it untouched.
    Declined,
    Served(Served),
}

/// The caching engine.
pub struct Engine {
    config: AppConfig,
    origin: Url,
    db: CacheDb,
    network: Arc<dyn Network>,
    generations: Generations,
    selector: StrategySelector,
    executor: StrategyExecutor,
    fallback: FallbackResolver,
    metrics: Arc<Metrics>,
    sync: BackgroundSyncQueue,
    notifier: Arc<dyn Notifier>,
    state: Mutex<LifecycleState>,
}

impl Engine {
    /// Build an engine that keeps durable state in `db` and logs notifications.
    pub fn new(config: AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let store: Arc<dyn DurableStore> = Arc::new(db.clone());
        Self::with_parts(config, db, network, store, Arc::new(LogNotifier))
    }

    pub fn with_parts(
        config: AppConfig, db: CacheDb, network: Arc<dyn Network>, store: Arc<dyn DurableStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, Error> {
        config
            .validate()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let origin = config
            .origin_url()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        let generations = config.generations();
        let selector = StrategySelector::new(origin.clone(), &config.api_patterns, &config.external_patterns)?;
        let metrics = Arc::new(Metrics::new(config.metrics_sample_rate).with_store(store.clone()));
        let executor = StrategyExecutor::new(
            db.clone(),
            network.clone(),
            metrics.clone(),
            generations.dynamic.clone(),
            Revalidator::new(config.max_revalidations),
        );
        let fallback = FallbackResolver::from_config(db.clone(), &config, &origin);
        let sync = BackgroundSyncQueue::new(store, network.clone(), config.sync_tag.clone());

        Ok(Self {
            config,
            origin,
            db,
            network,
            generations,
            selector,
            executor,
            fallback,
            metrics,
            sync,
            notifier,
            state: Mutex::new(LifecycleState::Parsed),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn generations(&self) -> &Generations {
        &self.generations
    }

    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// Build a GET descriptor, resolving `url` against the origin.
    pub fn descriptor(&self, url: &str, destination: Destination) -> Result<RequestDescriptor, Error> {
        RequestDescriptor::get(url, &self.origin, destination)
    }

    /// Run one request through the pipeline.
    ///
    /// Intercepted requests always get a response: strategy failures are
    /// answered by the fallback chain.
    pub async fn handle(&self, request: &RequestDescriptor) -> Interception {
        if !request.is_interceptable() {
            tracing::debug!(method = %request.method, url = %request.url, "declined");
            return Interception::Declined;
        }

        let strategy = self.selector.select(request);
        match self.executor.execute(strategy, request).await {
            Ok(served) => Interception::Served(served),
            Err(e) => {
                tracing::debug!(url = %request.url, %strategy, error = %e, "strategy failed, using fallback");
                let response = self.fallback.resolve(request).await;
                Interception::Served(Served { strategy, source: ResponseSource::Fallback, response })
            }
        }
    }

    /// Restore metrics and precache the static generation.
    ///
    /// Every precache URL is fetched before anything is written, and the
    /// responses are written in one transaction, so a failed install leaves
    /// the store untouched and the state unchanged.
    ///
    /// # Errors
    ///
    /// `Error::InstallFailed` when any URL fails to fetch or is not 2xx, or
    /// when the static generation cannot be written.
    pub async fn install(&self) -> Result<(), Error> {
        match self.metrics.restore().await {
            Ok(Some(snapshot)) => tracing::info!(?snapshot, "restored metrics"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to restore metrics"),
        }

        let result = self.precache().await;
        if let Err(e) = &result {
            tracing::error!(version = %self.config.version, error = %e, "install failed");
            return result;
        }

        let mut state = self.state.lock().await;
        if *state == LifecycleState::Parsed {
            *state = LifecycleState::Installed;
        }
        tracing::info!(
            version = %self.config.version,
            cache = %self.generations.static_assets,
            assets = self.config.precache_urls.len(),
            "installed"
        );
        Ok(())
    }

    async fn precache(&self) -> Result<(), Error> {
        let mut fetched = Vec::with_capacity(self.config.precache_urls.len());
        for url in &self.config.precache_urls {
            let request = self
                .descriptor(url, Destination::Other)
                .map_err(|e| Error::InstallFailed(format!("{url}: {e}")))?;
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{url}: {e}")))?;
            if !response.is_success() {
                return Err(Error::InstallFailed(format!("{url}: status {}", response.status)));
            }
            fetched.push((request.key()?, response));
        }

        let cache = &self.generations.static_assets;
        if let Err(e) = self.db.put_entries(cache, &fetched).await {
            self.metrics.record(MetricKind::StorageError).await;
            return Err(Error::InstallFailed(format!("writing {cache}: {e}")));
        }
        Ok(())
    }

    /// Delete undeclared generations and mark the version active.
    ///
    /// Returns the deleted generation names.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let deleted = self.db.collect_garbage(&self.generations).await?;
        *self.state.lock().await = LifecycleState::Activated;
        tracing::info!(version = %self.config.version, deleted = deleted.len(), "activated");
        Ok(deleted)
    }

    /// Activate now if installed. A version that never installed stays put.
    pub async fn skip_waiting(&self) -> Result<LifecycleState, Error> {
        match self.state().await {
            LifecycleState::Installed => {
                self.activate().await?;
            }
            LifecycleState::Parsed => {
                tracing::warn!(version = %self.config.version, "skip waiting requested before install");
            }
            LifecycleState::Activated => {}
        }
        Ok(self.state().await)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Delete every generation. Returns the number of generations removed.
    pub async fn clear_all(&self) -> Result<u64, Error> {
        let removed = self.db.clear_all().await?;
        tracing::info!(removed, "cleared all caches");
        Ok(removed)
    }

    pub async fn cache_names(&self) -> Result<Vec<String>, Error> {
        self.db.cache_names().await
    }

    /// Queue `request` for replay on the next sync trigger.
    pub async fn defer(&self, request: &RequestDescriptor) -> Result<u64, Error> {
        self.sync.enqueue(request).await
    }

    pub async fn pending_sync(&self) -> Result<Vec<crate::sync::PendingSyncTask>, Error> {
        self.sync.pending().await
    }

    pub async fn sync(&self, tag: &str) -> Result<SyncOutcome, Error> {
        self.sync.trigger(tag).await
    }

    /// Show the update notification for a push message.
    pub async fn push(&self, payload: Option<&str>) -> Result<Notification, Error> {
        let notification = push_notification(payload);
        self.notifier.notify(&notification).await?;
        Ok(notification)
    }

    pub fn click(&self, action: Option<&str>) -> ClickAction {
        let routed = route_click(action);
        tracing::debug!(?action, ?routed, "notification click");
        routed
    }

    /// Wait for detached refreshes and persist the metrics snapshot.
    pub async fn shutdown(&self) {
        self.executor.revalidator().drain().await;
        if let Err(e) = self.metrics.flush().await {
            tracing::warn!(error = %e, "failed to persist metrics on shutdown");
        }
        tracing::info!("engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::METRICS_KEY;
    use crate::strategy::Strategy;
    use crate::testing::{MockNetwork, html, memory_db, test_config};
    use async_trait::async_trait;
    use cachewarden_core::{CachedResponse, MemoryStore, RequestKey};
    use std::time::Duration;

    const ORIGIN: &str = "http://localhost:8080";

    struct Fixture {
        db: CacheDb,
        network: Arc<MockNetwork>,
        engine: Engine,
    }

    async fn fixture_with(config: AppConfig, network: MockNetwork) -> Fixture {
        let db = memory_db().await;
        let network = Arc::new(network);
        let engine = Engine::new(config, db.clone(), network.clone()).unwrap();
        Fixture { db, network, engine }
    }

    async fn fixture() -> Fixture {
        fixture_with(test_config(), MockNetwork::new()).await
    }

    fn script_precache(network: &MockNetwork) {
        for path in ["/", "/index.html", "/privacy.html", "/terms.html", "/manifest.json"] {
            network.respond(&format!("{ORIGIN}{path}"), html(path));
        }
    }

    fn served(interception: Interception) -> Served {
        match interception {
            Interception::Served(served) => served,
            Interception::Declined => panic!("request was declined"),
        }
    }

    #[tokio::test]
    async fn test_declines_non_get() {
        let f = fixture().await;
        let request = RequestDescriptor::new("POST", Url::parse("http://localhost:8080/api/x").unwrap(), Destination::Other);
        assert_eq!(f.engine.handle(&request).await, Interception::Declined);
        assert_eq!(f.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_then_hit() {
        let f = fixture().await;
        f.network.respond("http://localhost:8080/app.js", CachedResponse::ok("text/javascript", "A"));
        let request = f.engine.descriptor("/app.js", Destination::Script).unwrap();

        let first = served(f.engine.handle(&request).await);
        assert_eq!(first.strategy, Strategy::CacheFirst);
        assert_eq!(first.response.text(), "A");
        assert_eq!(f.engine.metrics().cache_misses, 1);
        let dynamic = &f.engine.generations().dynamic;
        assert_eq!(f.db.entry_count(dynamic).await.unwrap(), 1);

        let second = served(f.engine.handle(&request).await);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.response.text(), "A");
        assert_eq!(f.network.calls(), 1);
        assert_eq!(f.engine.metrics().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_api_offline_falls_back_to_cache() {
        let f = fixture().await;
        let url = "https://api.westvirginiadoc.com/data";
        f.db.put_entry("older", &RequestKey::get(url).unwrap(), &CachedResponse::ok("application/json", r#"{"x":1}"#))
            .await
            .unwrap();
        f.network.fail(url);

        let request = f.engine.descriptor(url, Destination::Other).unwrap();
        let served = served(f.engine.handle(&request).await);
        assert_eq!(served.strategy, Strategy::NetworkFirst);
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.text(), r#"{"x":1}"#);
        assert_eq!(f.engine.metrics().offline_requests, 1);
    }

    #[tokio::test]
    async fn test_activation_deletes_old_generations() {
        let f = fixture().await;
        let generations = f.engine.generations().clone();
        for name in ["old-v1", generations.static_assets.as_str(), generations.dynamic.as_str()] {
            f.db.open_cache(name).await.unwrap();
        }

        let deleted = f.engine.activate().await.unwrap();
        assert_eq!(deleted, vec!["old-v1".to_string()]);

        let names = f.engine.cache_names().await.unwrap();
        assert!(names.contains(&generations.static_assets));
        assert!(names.contains(&generations.dynamic));
        assert!(!names.contains(&"old-v1".to_string()));
        assert_eq!(f.engine.state().await, LifecycleState::Activated);
    }

    #[tokio::test]
    async fn test_clear_all_empties_names() {
        let f = fixture().await;
        f.db.open_cache("a").await.unwrap();
        f.db.open_cache("b").await.unwrap();

        assert_eq!(f.engine.clear_all().await.unwrap(), 2);
        assert!(f.engine.cache_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_fallback_to_root() {
        let f = fixture().await;
        f.db.put_entry("static", &RequestKey::get("http://localhost:8080/index.html").unwrap(), &html("A"))
            .await
            .unwrap();

        let request = f.engine.descriptor("/about", Destination::Document).unwrap();
        let served = served(f.engine.handle(&request).await);
        assert_eq!(served.source, ResponseSource::Fallback);
        assert_eq!(served.response.status, 200);
        assert_eq!(served.response.text(), "A");
    }

    #[tokio::test]
    async fn test_document_fallback_offline_response() {
        let f = fixture().await;
        let request = f.engine.descriptor("/about", Destination::Document).unwrap();

        let served = served(f.engine.handle(&request).await);
        assert_eq!(served.source, ResponseSource::Fallback);
        assert_eq!(served.response.status, 503);
        let body: serde_json::Value = serde_json::from_slice(&served.response.body).unwrap();
        assert_eq!(body["error"], "Network error");
    }

    #[tokio::test]
    async fn test_failed_asset_is_answered_by_fallback() {
        let f = fixture().await;
        let request = f.engine.descriptor("/missing.png", Destination::Image).unwrap();
        f.network.fail("http://localhost:8080/missing.png");

        let served = served(f.engine.handle(&request).await);
        assert_eq!(served.source, ResponseSource::Fallback);
        assert_eq!(served.response.status, 503);
    }

    #[tokio::test]
    async fn test_swr_document_returns_without_waiting() {
        let f = fixture_with(test_config(), MockNetwork::gated()).await;
        let url = "http://localhost:8080/index.html";
        f.db.put_entry(&f.engine.generations().dynamic, &RequestKey::get(url).unwrap(), &html("stale"))
            .await
            .unwrap();
        f.network.respond(url, html("fresh"));

        let request = f.engine.descriptor("/index.html", Destination::Document).unwrap();
        let interception = tokio::time::timeout(Duration::from_secs(1), f.engine.handle(&request))
            .await
            .expect("stale-while-revalidate waited on the network");
        let served = served(interception);
        assert_eq!(served.strategy, Strategy::StaleWhileRevalidate);
        assert_eq!(served.response.text(), "stale");

        f.network.release();
        f.engine.shutdown().await;
        let stored = f.db.match_in(&f.engine.generations().dynamic, &RequestKey::get(url).unwrap()).await.unwrap();
        assert_eq!(stored.unwrap().response.text(), "fresh");
    }

    #[tokio::test]
    async fn test_install_precaches_static_generation() {
        let f = fixture().await;
        script_precache(&f.network);

        f.engine.install().await.unwrap();

        let cache = &f.engine.generations().static_assets;
        assert_eq!(f.db.entry_count(cache).await.unwrap(), 5);
        assert_eq!(f.engine.state().await, LifecycleState::Installed);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let f = fixture().await;
        script_precache(&f.network);
        f.network.respond("http://localhost:8080/terms.html", CachedResponse::new(404, vec![], ""));

        let err = f.engine.install().await.unwrap_err();
        assert!(matches!(err, Error::InstallFailed(_)));
        assert!(f.engine.cache_names().await.unwrap().is_empty());
        assert_eq!(f.engine.state().await, LifecycleState::Parsed);
    }

    #[tokio::test]
    async fn test_install_write_failure_stores_nothing() {
        let f = fixture().await;
        script_precache(&f.network);
        f.db.reject_writes_containing("terms").await.unwrap();

        let err = f.engine.install().await.unwrap_err();
        assert!(matches!(err, Error::InstallFailed(_)));

        let cache = &f.engine.generations().static_assets;
        assert!(!f.db.has_cache(cache).await.unwrap());
        let index = RequestKey::get("http://localhost:8080/index.html").unwrap();
        assert!(f.db.match_entry(&index).await.unwrap().is_none());
        assert_eq!(f.engine.state().await, LifecycleState::Parsed);
        assert_eq!(f.engine.metrics().storage_errors, 1);
    }

    #[tokio::test]
    async fn test_skip_waiting() {
        let f = fixture().await;
        assert_eq!(f.engine.skip_waiting().await.unwrap(), LifecycleState::Parsed);

        script_precache(&f.network);
        f.db.open_cache("old-v1").await.unwrap();
        f.engine.install().await.unwrap();

        assert_eq!(f.engine.skip_waiting().await.unwrap(), LifecycleState::Activated);
        assert!(!f.db.has_cache("old-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_install_restores_metrics() {
        let db = memory_db().await;
        let store = Arc::new(MemoryStore::new());
        store.put(METRICS_KEY, r#"{"cacheHits":7}"#).await.unwrap();
        let network = Arc::new(MockNetwork::new());
        script_precache(&network);

        let engine = Engine::with_parts(test_config(), db, network, store, Arc::new(LogNotifier)).unwrap();
        engine.install().await.unwrap();

        assert_eq!(engine.metrics().cache_hits, 7);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_metrics() {
        let db = memory_db().await;
        let store = Arc::new(MemoryStore::new());
        let network = Arc::new(MockNetwork::new());
        network.respond("http://localhost:8080/a.css", CachedResponse::ok("text/css", "a"));
        let engine = Engine::with_parts(test_config(), db, network, store.clone(), Arc::new(LogNotifier)).unwrap();

        let request = engine.descriptor("/a.css", Destination::Style).unwrap();
        engine.handle(&request).await;
        engine.shutdown().await;

        let json = store.get(METRICS_KEY).await.unwrap().unwrap();
        let persisted: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(persisted.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_defer_and_sync() {
        let f = fixture().await;
        let request = f.engine.descriptor("/api/report", Destination::Other).unwrap();
        f.engine.defer(&request).await.unwrap();
        f.network.respond("http://localhost:8080/api/report", html("ok"));

        let outcome = f.engine.sync("background-sync").await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Completed(r) if r.replayed == 1));
        assert!(f.engine.pending_sync().await.unwrap().is_empty());
    }

    struct RecordingNotifier(std::sync::Mutex<Vec<Notification>>);

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<(), Error> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_push_reaches_notifier() {
        let db = memory_db().await;
        let notifier = Arc::new(RecordingNotifier(std::sync::Mutex::new(Vec::new())));
        let store: Arc<dyn DurableStore> = Arc::new(db.clone());
        let engine =
            Engine::with_parts(test_config(), db, Arc::new(MockNetwork::new()), store, notifier.clone()).unwrap();

        engine.push(Some("v3.1")).await.unwrap();

        let shown = notifier.0.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].body, "v3.1");
        assert_eq!(engine.click(Some("explore")), ClickAction::OpenWindow("/".into()));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = AppConfig { cache_prefix: String::new(), ..test_config() };
        let result = Engine::new(config, memory_db().await, Arc::new(MockNetwork::new()));
        assert!(result.is_err());
    }
}
