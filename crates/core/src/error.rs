//! Unified error types for cachewarden.
//!
//! Errors fall into three families that drive the fallback chain:
//! network failures, cache misses and storage faults. The remaining
//! variants cover input validation and lifecycle failures.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the caching engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a non-GET method where a cache key is required).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unsupported URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The fetch transport failed before producing a response.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// No stored entry matches the request.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data could not be encoded or decoded.
    #[error("STORAGE_ERROR: {0}")]
    Storage(String),

    /// Precaching failed; the new version was not installed.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),
}

impl Error {
    /// True for failures of the fetch transport.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::FetchTimeout(_) | Error::FetchTooLarge(_))
    }

    /// True for failures of the storage layer itself.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Database(_) | Error::MigrationFailed(_) | Error::Storage(_))
    }

    /// JSON-RPC error code reported to MCP clients.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) => -32602,
            Error::CacheMiss(_) => -32001,
            Error::Database(_) | Error::MigrationFailed(_) | Error::Storage(_) => -32002,
            Error::InvalidUrl(_) => -32003,
            Error::FetchTimeout(_) => -32006,
            Error::FetchTooLarge(_) => -32007,
            Error::Network(_) => -32008,
            Error::InstallFailed(_) => -32013,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(format!("serialization failed: {err}"))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        McpError { code: ErrorCode(err.code()), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("https://example.com/".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn test_mcp_error_keeps_code_and_message() {
        let mcp_err: McpError = Error::CacheMiss("abc123".to_string()).into();
        assert_eq!(mcp_err.code.0, -32001);
        assert_eq!(mcp_err.message, "CACHE_MISS: abc123");

        let storage: McpError = Error::MigrationFailed("v2".into()).into();
        assert_eq!(storage.code.0, Error::Storage(String::new()).code());
    }

    #[test]
    fn test_error_families() {
        assert!(Error::Network("refused".into()).is_network());
        assert!(Error::FetchTimeout("slow".into()).is_network());
        assert!(!Error::CacheMiss("x".into()).is_network());
        assert!(Error::Storage("bad row".into()).is_storage());
        assert!(!Error::Network("refused".into()).is_storage());
    }
}
