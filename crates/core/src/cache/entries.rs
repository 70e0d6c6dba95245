//! Cache entry operations.
//!
//! Provides the store manager operations over named generations:
//! open, put, match, delete and list.

use super::connection::CacheDb;
use super::key::RequestKey;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored or fetched HTTP response.
///
/// Headers keep their original order and may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers, body: body.into() }
    }

    /// A `200 OK` response with the given content type.
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, vec![("content-type".to_string(), content_type.to_string())], body)
    }

    /// Whether the status is 2xx. Only such responses are written to the cache.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A response stored inside one named generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_name: String,
    pub url: String,
    pub response: CachedResponse,
    pub stored_at: String,
}

struct EntryInsert {
    hash: String,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryInsert {
    fn new(key: &RequestKey, response: &CachedResponse) -> Result<Self, Error> {
        Ok(Self {
            hash: key.hash(),
            method: key.method().to_string(),
            url: key.url().to_string(),
            status: i64::from(response.status),
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.clone(),
        })
    }
}

type EntryRow = (String, String, i64, String, Vec<u8>, String);

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn decode_entry((cache_name, url, status, headers_json, body, stored_at): EntryRow) -> Result<CacheEntry, Error> {
    let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;
    let status = u16::try_from(status).map_err(|_| Error::Storage(format!("invalid stored status {status}")))?;
    Ok(CacheEntry { cache_name, url, response: CachedResponse { status, headers, body }, stored_at })
}

impl CacheDb {
    /// Open a generation, creating it if absent. Idempotent.
    pub async fn open_cache(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)", params![name, now])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a generation with this name exists.
    pub async fn has_cache(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response under `key` in generation `name`.
    ///
    /// Creates the generation if needed. Uses UPSERT semantics, so the last
    /// write for a key wins.
    pub async fn put_entry(&self, name: &str, key: &RequestKey, response: &CachedResponse) -> Result<(), Error> {
        self.insert_rows(name, vec![EntryInsert::new(key, response)?]).await
    }

    /// Store several responses in generation `name` as one transaction.
    ///
    /// Either every row is written (and the generation created) or none is.
    pub async fn put_entries(&self, name: &str, entries: &[(RequestKey, CachedResponse)]) -> Result<(), Error> {
        let rows = entries
            .iter()
            .map(|(key, response)| EntryInsert::new(key, response))
            .collect::<Result<Vec<_>, Error>>()?;
        self.insert_rows(name, rows).await
    }

    async fn insert_rows(&self, name: &str, rows: Vec<EntryInsert>) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.unchecked_transaction()?;
                tx.execute("INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)", params![name, now])?;
                let mut stmt = tx.prepare(
                    "INSERT INTO cache_entries (cache_id, key_hash, method, url, status, headers_json, body, stored_at)
                    VALUES ((SELECT id FROM caches WHERE name = ?1), ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(cache_id, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                )?;
                for row in &rows {
                    stmt.execute(params![name, row.hash, row.method, row.url, row.status, row.headers_json, row.body, now])?;
                }
                drop(stmt);
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Find an entry for `key` in any generation.
    ///
    /// Generations are searched in creation order and the first match wins.
    /// A URL present in an older generation therefore shadows later writes
    /// to a newer one: a precached asset keeps being served from the static
    /// generation even after a refresh lands in the dynamic generation.
    pub async fn match_entry(&self, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        let hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT c.name, e.url, e.status, e.headers_json, e.body, e.stored_at
                    FROM cache_entries e JOIN caches c ON c.id = e.cache_id
                    WHERE e.key_hash = ?1
                    ORDER BY c.id ASC
                    LIMIT 1",
                )?;

                match stmt.query_row(params![hash], entry_from_row) {
                    Ok(row) => decode_entry(row).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Find an entry for `key` in a single generation.
    pub async fn match_in(&self, name: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        let name = name.to_string();
        let hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT c.name, e.url, e.status, e.headers_json, e.body, e.stored_at
                    FROM cache_entries e JOIN caches c ON c.id = e.cache_id
                    WHERE c.name = ?1 AND e.key_hash = ?2",
                )?;

                match stmt.query_row(params![name, hash], entry_from_row) {
                    Ok(row) => decode_entry(row).map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and all of its entries.
    ///
    /// Returns false if no generation had that name.
    pub async fn delete_cache(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all existing generations, oldest first.
    pub async fn cache_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY id ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let deleted = conn.execute("DELETE FROM caches", [])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries stored in a generation.
    pub async fn entry_count(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries e JOIN caches c ON c.id = e.cache_id WHERE c.name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
