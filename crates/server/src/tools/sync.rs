//! background_sync tool implementation.
//!
//! Delivers a sync trigger and reports what the drain did.

use cachewarden_client::{Engine, SyncOutcome, SyncReport};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the background_sync tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundSyncParams {
    /// Sync tag. Defaults to the configured tag.
    #[serde(default)]
    pub tag: Option<String>,
}

/// Output from the background_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundSyncOutput {
    /// One of "completed", "already_running" or "unknown_tag".
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
    /// Tasks still queued after this trigger.
    pub pending: usize,
}

pub async fn sync_impl(engine: &Engine, params: BackgroundSyncParams) -> Result<CallToolResult, McpError> {
    let tag = params.tag.unwrap_or_else(|| engine.config().sync_tag.clone());

    let (outcome, report) = match engine.sync(&tag).await? {
        SyncOutcome::Completed(report) => ("completed", Some(report)),
        SyncOutcome::AlreadyRunning => ("already_running", None),
        SyncOutcome::UnknownTag => ("unknown_tag", None),
    };
    let pending = engine.pending_sync().await?.len();

    let output = BackgroundSyncOutput { outcome: outcome.to_string(), report, pending };
    json_result(&output)
}
