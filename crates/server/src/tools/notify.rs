//! push_notify and notification_click tool implementations.

use cachewarden_client::{ClickAction, Engine, Notification};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the push_notify tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PushNotifyParams {
    /// Push message text. Empty or missing uses the default body.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Parameters for the notification_click tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    /// Id of the clicked action; omit for a click on the notification body.
    #[serde(default)]
    pub action: Option<String>,
}

pub async fn push_impl(engine: &Engine, params: PushNotifyParams) -> Result<CallToolResult, McpError> {
    let notification: Notification = engine.push(params.payload.as_deref()).await?;
    json_result(&notification)
}

pub fn click_impl(engine: &Engine, params: NotificationClickParams) -> Result<CallToolResult, McpError> {
    let action: ClickAction = engine.click(params.action.as_deref());
    json_result(&action)
}
