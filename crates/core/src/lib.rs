//! Core types and shared functionality for cachewarden.
//!
//! This crate provides:
//! - The cache store manager (named generations) with a SQLite backend
//! - The durable key-value storage contract
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{CacheDb, CacheEntry, CachedResponse, Generations, RequestKey};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use storage::{DurableStore, MemoryStore};
