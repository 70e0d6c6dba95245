//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use cachewarden_client::{AdminHandle, Engine};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::{
    BackgroundSyncParams, CacheFetchParams, NotificationClickParams, PushNotifyParams, admin, fetch, notify, sync,
};

/// The main MCP server handler for cachewarden.
#[derive(Clone)]
pub struct CacheWardenServer {
    tool_router: ToolRouter<Self>,
    engine: Arc<Engine>,
    admin: AdminHandle,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CacheWardenServer {
    /// Create a new server handler.
    pub fn new(engine: Arc<Engine>, admin: AdminHandle) -> Self {
        Self { tool_router: Self::tool_router(), engine, admin }
    }

    #[tool(
        description = "Fetch a URL through the caching engine. Picks a caching strategy, falls back to cached or offline responses, and reports the strategy and response source."
    )]
    async fn cache_fetch(&self, params: Parameters<CacheFetchParams>) -> Result<CallToolResult, McpError> {
        fetch::fetch_impl(&self.engine, params.0).await
    }

    #[tool(description = "Get cache hit, miss, network, offline and storage error counters.")]
    async fn get_metrics(&self) -> Result<CallToolResult, McpError> {
        admin::get_metrics_impl(&self.admin).await
    }

    #[tool(description = "Delete every cache generation. Replies with {success}.")]
    async fn clear_cache(&self) -> Result<CallToolResult, McpError> {
        admin::clear_cache_impl(&self.admin).await
    }

    #[tool(description = "Activate the installed version now, deleting outdated cache generations.")]
    async fn skip_waiting(&self) -> Result<CallToolResult, McpError> {
        admin::skip_waiting_impl(&self.admin).await
    }

    #[tool(description = "List cache generation names, oldest first.")]
    async fn list_caches(&self) -> Result<CallToolResult, McpError> {
        admin::list_caches_impl(&self.admin).await
    }

    #[tool(description = "Replay requests deferred for background sync. Only the configured sync tag drains the queue.")]
    async fn background_sync(&self, params: Parameters<BackgroundSyncParams>) -> Result<CallToolResult, McpError> {
        sync::sync_impl(&self.engine, params.0).await
    }

    #[tool(description = "Show the update notification for a push message.")]
    async fn push_notify(&self, params: Parameters<PushNotifyParams>) -> Result<CallToolResult, McpError> {
        notify::push_impl(&self.engine, params.0).await
    }

    #[tool(description = "Route a click on the update notification. Returns the window to open or dismiss.")]
    async fn notification_click(
        &self, params: Parameters<NotificationClickParams>,
    ) -> Result<CallToolResult, McpError> {
        notify::click_impl(&self.engine, params.0)
    }
}

impl ServerHandler for CacheWardenServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "cachewarden".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
