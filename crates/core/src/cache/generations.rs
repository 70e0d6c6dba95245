//! Versioned generation names and garbage collection.
//!
//! Every version declares exactly four generations. Anything else found in
//! the store at activation time belongs to an older version and is deleted.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// The generation names declared by one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generations {
    /// Version-tagged root generation, e.g. `WestVirginiaDoc-v3.0.0`.
    pub root: String,
    /// Precached assets written at install.
    pub static_assets: String,
    /// Runtime writes made by the strategies.
    pub dynamic: String,
    /// Reserved.
    pub runtime: String,
}

impl Generations {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self {
            root: format!("{prefix}-v{version}"),
            static_assets: format!("{prefix}-static-v{version}"),
            dynamic: format!("{prefix}-dynamic-v{version}"),
            runtime: format!("{prefix}-runtime-v{version}"),
        }
    }

    /// The declared set.
    pub fn declared(&self) -> [&str; 4] {
        [&self.root, &self.runtime, &self.static_assets, &self.dynamic]
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared().contains(&name)
    }
}

impl CacheDb {
    /// Delete every generation not declared by `generations`.
    ///
    /// All deletions happen in one transaction, so once this returns no
    /// undeclared generation can be matched. Returns the deleted names.
    pub async fn collect_garbage(&self, generations: &Generations) -> Result<Vec<String>, Error> {
        let existing = self.cache_names().await?;
        let stale: Vec<String> = existing
            .into_iter()
            .filter(|name| !generations.is_declared(name))
            .collect();

        if stale.is_empty() {
            return Ok(stale);
        }

        for name in &stale {
            tracing::info!(cache = %name, "deleting old cache generation");
        }

        let to_delete = stale.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.unchecked_transaction()?;
                for name in &to_delete {
                    tx.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_names() {
        let generations = Generations::new("WestVirginiaDoc", "3.0.0");
        assert_eq!(generations.root, "WestVirginiaDoc-v3.0.0");
        assert_eq!(generations.static_assets, "WestVirginiaDoc-static-v3.0.0");
        assert_eq!(generations.dynamic, "WestVirginiaDoc-dynamic-v3.0.0");
        assert_eq!(generations.runtime, "WestVirginiaDoc-runtime-v3.0.0");
        assert!(generations.is_declared("WestVirginiaDoc-runtime-v3.0.0"));
        assert!(!generations.is_declared("WestVirginiaDoc-static-v2.0.0"));
    }

    #[tokio::test]
    async fn test_gc_deletes_undeclared_generations() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let generations = Generations::new("WestVirginiaDoc", "3.0.0");

        db.open_cache("old-v1").await.unwrap();
        db.open_cache("WestVirginiaDoc-static-v2.0.0").await.unwrap();
        db.open_cache(&generations.static_assets).await.unwrap();
        db.open_cache(&generations.dynamic).await.unwrap();

        let deleted = db.collect_garbage(&generations).await.unwrap();
        assert_eq!(deleted, vec!["old-v1".to_string(), "WestVirginiaDoc-static-v2.0.0".to_string()]);

        let remaining = db.cache_names().await.unwrap();
        assert_eq!(remaining, vec![generations.static_assets.clone(), generations.dynamic.clone()]);
        assert!(remaining.iter().all(|name| generations.is_declared(name)));
    }

    #[tokio::test]
    async fn test_gc_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let generations = Generations::new("WestVirginiaDoc", "3.0.0");

        db.open_cache("old-v1").await.unwrap();
        db.open_cache(&generations.root).await.unwrap();

        db.collect_garbage(&generations).await.unwrap();
        let once = db.cache_names().await.unwrap();

        let second = db.collect_garbage(&generations).await.unwrap();
        let twice = db.cache_names().await.unwrap();

        assert!(second.is_empty());
        assert_eq!(once, twice);
    }
}
