//! MCP tool implementations.
//!
//! This module contains all tools exposed by the cachewarden server.

pub mod admin;
pub mod fetch;
pub mod notify;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

use cachewarden_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

pub use fetch::CacheFetchParams;
pub use notify::{NotificationClickParams, PushNotifyParams};
pub use sync::BackgroundSyncParams;

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
