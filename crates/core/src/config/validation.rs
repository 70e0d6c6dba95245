//! Checks applied to a loaded `AppConfig` before the engine starts.

use crate::config::AppConfig;
use regex::Regex;
use thiserror::Error;

const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;
const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=300_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.to_string(), reason: reason.into() }
}

fn require(ok: bool, field: &str, reason: &str) -> Result<(), ConfigError> {
    if ok { Ok(()) } else { Err(invalid(field, reason)) }
}

impl AppConfig {
    /// Reject configurations the engine cannot run with.
    ///
    /// Cache naming must be non-empty, the origin must be absolute http(s),
    /// every route pattern must compile and the numeric limits must be in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(!self.cache_prefix.trim().is_empty(), "cache_prefix", "must not be empty")?;
        require(!self.version.trim().is_empty(), "version", "must not be empty")?;
        self.origin_url()?;

        let routes = [("api_patterns", &self.api_patterns), ("external_patterns", &self.external_patterns)];
        for (field, patterns) in routes {
            for pattern in patterns {
                if let Err(e) = Regex::new(pattern) {
                    return Err(invalid(field, format!("{pattern}: {e}")));
                }
            }
        }

        require(
            (0.0..=1.0).contains(&self.metrics_sample_rate),
            "metrics_sample_rate",
            "must be between 0 and 1",
        )?;
        require(self.max_revalidations > 0, "max_revalidations", "must be greater than 0")?;
        require(
            (1..=MAX_BODY_BYTES).contains(&self.max_bytes),
            "max_bytes",
            "must be between 1 byte and 50MB",
        )?;
        require(
            TIMEOUT_RANGE_MS.contains(&self.timeout_ms),
            "timeout_ms",
            "must be between 100ms and 5 minutes",
        )?;
        require(!self.user_agent.is_empty(), "user_agent", "must not be empty")?;

        if self.precache_urls.is_empty() {
            tracing::warn!("precache_urls is empty; offline navigations will fall back to the 503 response");
        }
        Ok(())
    }
}
