//! SQLite-backed store of named cache generations.
//!
//! This module provides the cache store manager used by the strategy
//! engine, with async access via tokio-rusqlite. It supports:
//!
//! - Named, independently deletable generations
//! - Entries keyed by a normalized GET request, last write wins
//! - Cross-generation lookups in generation creation order
//! - Version-based garbage collection of undeclared generations
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod generations;
pub mod key;
pub mod migrations;
pub mod url;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, CachedResponse};
pub use generations::Generations;
pub use key::RequestKey;
