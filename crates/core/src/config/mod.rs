//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CACHEWARDEN_*)
//! 2. TOML config file (if CACHEWARDEN_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::Generations;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CACHEWARDEN_*)
/// 2. TOML config file (if CACHEWARDEN_CONFIG_FILE set)
/// 3. Built-in defaults
///
/// List-valued fields accept figment's array syntax in the environment,
/// e.g. `CACHEWARDEN_PRECACHE_URLS='["/", "/index.html"]'`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding cache generations and durable state.
    ///
    /// Set via CACHEWARDEN_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the application the engine serves.
    ///
    /// Relative URLs are resolved against it and it decides which requests are same-origin.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix shared by every cache generation name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Application version; part of every generation name.
    #[serde(default = "default_version")]
    pub version: String,

    /// URLs fetched into the static generation at install time, in order.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,

    /// Patterns that route a request to network-first.
    #[serde(default = "default_api_patterns")]
    pub api_patterns: Vec<String>,

    /// Third-party hosts whose assets are served cache-first.
    #[serde(default = "default_external_patterns")]
    pub external_patterns: Vec<String>,

    /// Document served to navigations when everything else failed.
    #[serde(default = "default_root_document")]
    pub root_document: String,

    /// Human-readable message placed in the synthetic offline response.
    #[serde(default = "default_offline_message")]
    pub offline_message: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via CACHEWARDEN_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum number of detached stale-while-revalidate refreshes in flight.
    #[serde(default = "default_max_revalidations")]
    pub max_revalidations: usize,

    /// Probability that recording a metric also persists the snapshot.
    #[serde(default = "default_metrics_sample_rate")]
    pub metrics_sample_rate: f64,

    /// Tag that drains the background sync queue.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Activate a freshly installed version without waiting for an explicit SKIP_WAITING.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cachewarden.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_cache_prefix() -> String {
    "WestVirginiaDoc".into()
}

fn default_version() -> String {
    "3.0.0".into()
}

fn default_precache_urls() -> Vec<String> {
    ["/", "/index.html", "/privacy.html", "/terms.html", "/manifest.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_api_patterns() -> Vec<String> {
    vec![r"^https://api\.westvirginiadoc\.com".into(), "/api/".into()]
}

fn default_external_patterns() -> Vec<String> {
    vec![
        r"^https://fonts\.googleapis\.com".into(),
        r"^https://fonts\.gstatic\.com".into(),
        r"^https://cdn\.jsdelivr\.net".into(),
        r"^https://unpkg\.com".into(),
    ]
}

fn default_root_document() -> String {
    "/index.html".into()
}

fn default_offline_message() -> String {
    "You appear to be offline. Please check your connection.".into()
}

fn default_user_agent() -> String {
    "cachewarden/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_max_revalidations() -> usize {
    8
}

fn default_metrics_sample_rate() -> f64 {
    0.1
}

fn default_sync_tag() -> String {
    "background-sync".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            precache_urls: default_precache_urls(),
            api_patterns: default_api_patterns(),
            external_patterns: default_external_patterns(),
            root_document: default_root_document(),
            offline_message: default_offline_message(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_revalidations: default_max_revalidations(),
            metrics_sample_rate: default_metrics_sample_rate(),
            sync_tag: default_sync_tag(),
            skip_waiting: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The configured origin as a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") }),
        }
    }

    /// Generation names declared for the configured version.
    pub fn generations(&self) -> Generations {
        Generations::new(&self.cache_prefix, &self.version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CACHEWARDEN_`
    /// 2. TOML file from `CACHEWARDEN_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CACHEWARDEN_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CACHEWARDEN_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
