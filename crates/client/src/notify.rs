//! Update notifications and click routing.
//!
//! Displaying a notification is the host's job; the engine only builds the
//! payload and hands it to a [`Notifier`].

use async_trait::async_trait;
use cachewarden_core::Error;
use serde::{Deserialize, Serialize};

pub const NOTIFICATION_TITLE: &str = "WVDoc Update";
pub const DEFAULT_BODY: &str = "New update available";
pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

/// URL opened by the explore action.
pub const EXPLORE_URL: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub actions: Vec<NotificationAction>,
}

/// Something that can show a notification to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), Error>;
}

/// Notifier that only writes the notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), Error> {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            actions = notification.actions.len(),
            "notification"
        );
        Ok(())
    }
}

/// Build the update notification for a push message.
///
/// An empty or missing payload gets the default body.
pub fn push_notification(payload: Option<&str>) -> Notification {
    let body = payload.map(str::trim).filter(|p| !p.is_empty()).unwrap_or(DEFAULT_BODY);
    Notification {
        title: NOTIFICATION_TITLE.to_string(),
        body: body.to_string(),
        icon: "/icon-192x192.png".to_string(),
        badge: "/badge-72x72.png".to_string(),
        actions: vec![
            NotificationAction {
                id: EXPLORE_ACTION.to_string(),
                label: "View Update".to_string(),
                icon: "/icon-explore.png".to_string(),
            },
            NotificationAction {
                id: CLOSE_ACTION.to_string(),
                label: "Close".to_string(),
                icon: "/icon-close.png".to_string(),
            },
        ],
    }
}

/// What the host should do after a notification was clicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "type", content = "url", rename_all = "snake_case")]
pub enum ClickAction {
    OpenWindow(String),
    Dismiss,
}

/// Route a click on `action`. `None` is a click on the notification body.
pub fn route_click(action: Option<&str>) -> ClickAction {
    match action {
        Some(EXPLORE_ACTION) => ClickAction::OpenWindow(EXPLORE_URL.to_string()),
        _ => ClickAction::Dismiss,
    }
}
