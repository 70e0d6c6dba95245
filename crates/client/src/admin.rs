//! Administrative commands, processed one at a time by a single task.

use std::sync::Arc;

use cachewarden_core::Error;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::{Engine, LifecycleState};
use crate::metrics::MetricsSnapshot;

const QUEUE_DEPTH: usize = 32;

/// Reply to a clear-cache command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ClearCacheReply {
    pub success: bool,
}

pub enum AdminCommand {
    SkipWaiting { reply: oneshot::Sender<Result<LifecycleState, Error>> },
    GetMetrics { reply: oneshot::Sender<MetricsSnapshot> },
    ClearCache { reply: oneshot::Sender<ClearCacheReply> },
    ListCaches { reply: oneshot::Sender<Result<Vec<String>, Error>> },
}

/// Cheap, cloneable client for the admin task.
#[derive(Debug, Clone)]
pub struct AdminHandle {
    tx: mpsc::Sender<AdminCommand>,
}

fn closed() -> Error {
    Error::Storage("admin task is not running".to_string())
}

impl AdminHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> AdminCommand) -> Result<T, Error> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    pub async fn skip_waiting(&self) -> Result<LifecycleState, Error> {
        self.call(|reply| AdminCommand::SkipWaiting { reply }).await?
    }

    pub async fn get_metrics(&self) -> Result<MetricsSnapshot, Error> {
        self.call(|reply| AdminCommand::GetMetrics { reply }).await
    }

    pub async fn clear_cache(&self) -> Result<ClearCacheReply, Error> {
        self.call(|reply| AdminCommand::ClearCache { reply }).await
    }

    pub async fn list_caches(&self) -> Result<Vec<String>, Error> {
        self.call(|reply| AdminCommand::ListCaches { reply }).await?
    }
}

/// Start the admin task. It exits once every handle is dropped.
pub fn spawn_admin(engine: Arc<Engine>) -> (AdminHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
    let task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            dispatch(&engine, command).await;
        }
        tracing::debug!("admin task stopped");
    });
    (AdminHandle { tx }, task)
}

async fn dispatch(engine: &Engine, command: AdminCommand) {
    // Dropped receivers only mean the caller stopped waiting.
    match command {
        AdminCommand::SkipWaiting { reply } => {
            let _ = reply.send(engine.skip_waiting().await);
        }
        AdminCommand::GetMetrics { reply } => {
            let _ = reply.send(engine.metrics());
        }
        AdminCommand::ClearCache { reply } => {
            let success = match engine.clear_all().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "clear cache failed");
                    false
                }
            };
            let _ = reply.send(ClearCacheReply { success });
        }
        AdminCommand::ListCaches { reply } => {
            let _ = reply.send(engine.cache_names().await);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Destination;
    use crate::testing::{MockNetwork, html, memory_db, test_config};
    use cachewarden_core::CacheDb;

    async fn start() -> (CacheDb, Arc<MockNetwork>, AdminHandle, Arc<Engine>) {
        let db = memory_db().await;
        let network = Arc::new(MockNetwork::new());
        let engine = Arc::new(Engine::new(test_config(), db.clone(), network.clone()).unwrap());
        let (handle, _task) = spawn_admin(engine.clone());
        (db, network, handle, engine)
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let (db, _, admin, _) = start().await;
        db.open_cache("WestVirginiaDoc-static-v3.0.0").await.unwrap();
        db.open_cache("old-v1").await.unwrap();

        assert_eq!(admin.clear_cache().await.unwrap(), ClearCacheReply { success: true });
        assert!(admin.list_caches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_metrics() {
        let (_, network, admin, engine) = start().await;
        network.respond("http://localhost:8080/a.css", html("a"));
        let request = engine.descriptor("/a.css", Destination::Style).unwrap();
        engine.handle(&request).await;
        engine.handle(&request).await;

        let snapshot = admin.get_metrics().await.unwrap();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_skip_waiting_before_install() {
        let (_, _, admin, _) = start().await;
        assert_eq!(admin.skip_waiting().await.unwrap(), LifecycleState::Parsed);
    }

    #[tokio::test]
    async fn test_list_caches() {
        let (db, _, admin, _) = start().await;
        db.open_cache("a").await.unwrap();
        db.open_cache("b").await.unwrap();

        assert_eq!(admin.list_caches().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_task_errors() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = AdminHandle { tx };
        assert!(handle.get_metrics().await.is_err());
    }
}
