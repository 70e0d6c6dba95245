//! cache_fetch tool implementation.
//!
//! Runs a GET through the caching pipeline and reports how it was served.

use cachewarden_client::{Destination, Engine, Interception, ResponseSource, Strategy};
use cachewarden_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchParams {
    /// URL to fetch. Relative URLs are resolved against the configured origin.
    pub url: String,

    /// Request destination: document, style, script, image or other (default).
    #[serde(default)]
    pub destination: Destination,

    /// Queue the request for background sync when only a fallback could be served.
    #[serde(default)]
    pub defer_on_failure: bool,
}

/// Output from the cache_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFetchOutput {
    pub url: String,
    pub strategy: Strategy,
    pub source: ResponseSource,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Response body decoded as UTF-8 (lossy).
    pub body: String,
    /// Background sync task id, when the request was deferred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deferred_id: Option<u64>,
}

/// Implementation of the cache_fetch tool.
pub async fn fetch_impl(engine: &Engine, params: CacheFetchParams) -> Result<CallToolResult, McpError> {
    let request = engine.descriptor(&params.url, params.destination)?;

    let served = match engine.handle(&request).await {
        Interception::Served(served) => served,
        Interception::Declined => {
            return Err(Error::InvalidInput(format!("request for {} is not intercepted", request.url)).into());
        }
    };

    let deferred_id = if params.defer_on_failure && served.source == ResponseSource::Fallback {
        Some(engine.defer(&request).await?)
    } else {
        None
    };

    let output = CacheFetchOutput {
        url: request.url.to_string(),
        strategy: served.strategy,
        source: served.source,
        status: served.response.status,
        content_type: served.response.content_type().map(str::to_string),
        body: served.response.text(),
        headers: served.response.headers,
        deferred_id,
    };
    json_result(&output)
}
