//! Last-resort responses for requests whose strategy failed.

use cachewarden_core::cache::url::resolve;
use cachewarden_core::{AppConfig, CacheDb, CachedResponse, RequestKey};
use chrono::{SecondsFormat, Utc};
use url::Url;

use crate::request::{Destination, RequestDescriptor};

/// Status of the synthetic offline response.
pub const OFFLINE_STATUS: u16 = 503;

/// Produces a response for a failed request. Never fails.
///
/// Tried in order:
/// 1. any cached entry for the exact request
/// 2. for documents, the cached root document
/// 3. a synthetic `503` JSON body
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    db: CacheDb,
    root_document: Option<RequestKey>,
    offline_message: String,
}

impl FallbackResolver {
    pub fn new(db: CacheDb, root_document: Option<RequestKey>, offline_message: impl Into<String>) -> Self {
        Self { db, root_document, offline_message: offline_message.into() }
    }

    pub fn from_config(db: CacheDb, config: &AppConfig, origin: &Url) -> Self {
        let root_document = resolve(&config.root_document, origin)
            .ok()
            .and_then(|url| RequestKey::get(url.as_str()).ok());
        if root_document.is_none() {
            tracing::warn!(root_document = %config.root_document, "root document is not a valid URL, document fallback disabled");
        }
        Self::new(db, root_document, config.offline_message.clone())
    }

    pub async fn resolve(&self, request: &RequestDescriptor) -> CachedResponse {
        if let Ok(key) = request.key()
            && let Some(response) = self.lookup(&key).await
        {
            tracing::debug!(url = %request.url, "fallback: exact cache match");
            return response;
        }

        if request.destination == Destination::Document
            && let Some(root) = &self.root_document
            && let Some(response) = self.lookup(root).await
        {
            tracing::debug!(url = %request.url, root = %root.url(), "fallback: root document");
            return response;
        }

        tracing::debug!(url = %request.url, "fallback: offline response");
        self.offline_response()
    }

    async fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
        match self.db.match_entry(key).await {
            Ok(entry) => entry.map(|e| e.response),
            Err(e) => {
                tracing::warn!(url = %key.url(), error = %e, "fallback cache lookup failed");
                None
            }
        }
    }

    /// The synthetic `503` served when nothing cached applies.
    pub fn offline_response(&self) -> CachedResponse {
        let body = serde_json::json!({
            "error": "Network error",
            "message": self.offline_message,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        CachedResponse::new(
            OFFLINE_STATUS,
            vec![("content-type".to_string(), "application/json".to_string())],
            body.to_string(),
        )
    }
}
