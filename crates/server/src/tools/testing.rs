//! Shared fixtures for the tool tests.

use std::sync::Arc;

use cachewarden_client::Engine;
use cachewarden_client::testing::{memory_db, test_config};
use rmcp::model::CallToolResult;
use serde::de::DeserializeOwned;

pub use cachewarden_client::testing::MockNetwork;

pub async fn engine(network: MockNetwork) -> Engine {
    Engine::new(test_config(), memory_db().await, Arc::new(network)).unwrap()
}

/// Decode the JSON text content of a tool result.
pub fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
    let content = serde_json::to_value(&result.content[0]).unwrap();
    let text = content
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
