//! Fault injection for storage tests in dependent crates.

use crate::{CacheDb, Error};

impl CacheDb {
    /// Make every entry write whose URL contains `needle` abort with a
    /// constraint error, as a full disk or exhausted quota would.
    pub async fn reject_writes_containing(&self, needle: &str) -> Result<(), Error> {
        let needle = needle.replace('\'', "''");
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute_batch(&format!(
                    "CREATE TRIGGER IF NOT EXISTS reject_entry_writes
                     BEFORE INSERT ON cache_entries
                     WHEN NEW.url LIKE '%{needle}%'
                     BEGIN SELECT RAISE(ABORT, 'quota exceeded'); END;"
                ))?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use crate::{CacheDb, CachedResponse, RequestKey};

    #[tokio::test]
    async fn test_rejected_write_surfaces_as_storage_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.reject_writes_containing("terms").await.unwrap();

        let blocked = RequestKey::get("https://example.com/terms.html").unwrap();
        let allowed = RequestKey::get("https://example.com/index.html").unwrap();
        let response = CachedResponse::ok("text/html", "x");

        let err = db.put_entry("static", &blocked, &response).await.unwrap_err();
        assert!(err.is_storage());
        db.put_entry("static", &allowed, &response).await.unwrap();
    }
}
