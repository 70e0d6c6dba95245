//! Administrative tools: get_metrics, clear_cache, skip_waiting, list_caches.
//!
//! Each call goes through the admin command queue and waits for its reply.

use cachewarden_client::{AdminHandle, LifecycleState};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Output from the skip_waiting tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SkipWaitingOutput {
    pub state: LifecycleState,
}

/// Output from the list_caches tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListCachesOutput {
    /// Generation names, oldest first.
    pub caches: Vec<String>,
}

pub async fn get_metrics_impl(admin: &AdminHandle) -> Result<CallToolResult, McpError> {
    let snapshot = admin.get_metrics().await?;
    json_result(&snapshot)
}

pub async fn clear_cache_impl(admin: &AdminHandle) -> Result<CallToolResult, McpError> {
    let reply = admin.clear_cache().await?;
    json_result(&reply)
}

pub async fn skip_waiting_impl(admin: &AdminHandle) -> Result<CallToolResult, McpError> {
    let state = admin.skip_waiting().await?;
    json_result(&SkipWaitingOutput { state })
}

pub async fn list_caches_impl(admin: &AdminHandle) -> Result<CallToolResult, McpError> {
    let caches = admin.list_caches().await?;
    json_result(&ListCachesOutput { caches })
}
