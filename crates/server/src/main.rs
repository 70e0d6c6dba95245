//! cachewarden server entry point.
//!
//! Boots the caching engine and serves it over MCP on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use cachewarden_client::{Engine, FetchClient, FetchConfig, spawn_admin};
use cachewarden_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        version = %config.version,
        origin = %config.origin,
        db = %config.db_path.display(),
        "Starting cachewarden on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let network = FetchClient::new(FetchConfig::from(&config))?;
    let skip_waiting = config.skip_waiting;
    let engine = Arc::new(Engine::new(config, db, Arc::new(network))?);

    // A failed install keeps serving with whatever generations already exist.
    match engine.install().await {
        Ok(()) if skip_waiting => {
            engine.activate().await?;
        }
        Ok(()) => {}
        Err(e) => tracing::warn!(error = %e, "continuing without a fresh install"),
    }

    let (admin, admin_task) = spawn_admin(engine.clone());
    let handler = handler::CacheWardenServer::new(engine.clone(), admin);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    admin_task.abort();
    engine.shutdown().await;

    Ok(())
}
