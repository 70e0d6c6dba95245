//! Durable key-value storage for engine state that outlives a process.
//!
//! Pending background-sync tasks and persisted metrics only need four
//! operations, so they are written against [`DurableStore`] rather than a
//! concrete database. [`CacheDb`] implements it on the `kv_store` table;
//! [`MemoryStore`] is a process-local implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use crate::Error;
use crate::cache::CacheDb;

/// Key-value store with at-least-once durability.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Insert or replace the value under `key`.
    async fn put(&self, key: &str, value: &str) -> Result<(), Error>;

    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Remove `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Every stored pair, ordered by key.
    async fn list_all(&self) -> Result<Vec<(String, String)>, Error>;
}

#[async_trait]
impl DurableStore for CacheDb {
    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0));

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn list_all(&self) -> Result<Vec<(String, String)>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<(String, String)>, Error> {
                let mut stmt = conn.prepare("SELECT key, value FROM kv_store ORDER BY key ASC")?;
                let pairs = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<(String, String)>, _>>()?;
                Ok(pairs)
            })
            .await
            .map_err(Error::from)
    }
}

/// In-memory [`DurableStore`]. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<(String, String)>, Error> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
