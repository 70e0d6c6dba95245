//! Caching strategies.
//!
//! A [`StrategySelector`] maps each request to one of five strategies, and
//! the [`StrategyExecutor`] runs it against the cache store and the network.

pub mod executor;
pub mod revalidate;
pub mod selector;

use std::fmt;
use std::str::FromStr;

use cachewarden_core::{CachedResponse, Error};
use serde::{Deserialize, Serialize};

pub use executor::StrategyExecutor;
pub use revalidate::Revalidator;
pub use selector::{Rule, RulePredicate, StrategySelector};

/// How a request combines cache and network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    CacheOnly,
    NetworkOnly,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
            Strategy::CacheOnly => "cache-only",
            Strategy::NetworkOnly => "network-only",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache-first" => Ok(Strategy::CacheFirst),
            "network-first" => Ok(Strategy::NetworkFirst),
            "stale-while-revalidate" => Ok(Strategy::StaleWhileRevalidate),
            "cache-only" => Ok(Strategy::CacheOnly),
            "network-only" => Ok(Strategy::NetworkOnly),
            other => Err(Error::InvalidInput(format!("unknown strategy: {other}"))),
        }
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
    /// Produced by the fallback chain after the strategy failed.
    Fallback,
}

/// A response together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub strategy: Strategy,
    pub source: ResponseSource,
    pub response: CachedResponse,
}
