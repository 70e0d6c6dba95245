//! Normalized request identity.

use std::fmt;

use sha2::{Digest, Sha256};

use super::url::canonicalize;
use crate::Error;

/// The only method the cache stores responses for.
pub const CACHEABLE_METHOD: &str = "GET";

/// Normalized identity of a cacheable request.
///
/// Two requests with the same key are interchangeable for caching purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    url: String,
}

impl RequestKey {
    /// Build a key from a method and an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for any method other than GET and
    /// `Error::InvalidUrl` if the URL is not an absolute http(s) URL.
    pub fn new(method: &str, url: &str) -> Result<Self, Error> {
        if !method.eq_ignore_ascii_case(CACHEABLE_METHOD) {
            return Err(Error::InvalidInput(format!("only GET requests are cacheable, got {method}")));
        }
        let url = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { url: url.to_string() })
    }

    /// Shorthand for a GET key.
    pub fn get(url: &str) -> Result<Self, Error> {
        Self::new(CACHEABLE_METHOD, url)
    }

    pub fn method(&self) -> &str {
        CACHEABLE_METHOD
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Storage key: SHA-256 hex of `method \n url`.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(CACHEABLE_METHOD.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", CACHEABLE_METHOD, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let a = RequestKey::get("https://Example.com/page#top").unwrap();
        let b = RequestKey::get("https://example.com/page").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_method_case_insensitive() {
        let key = RequestKey::new("get", "https://example.com/").unwrap();
        assert_eq!(key.method(), "GET");
    }

    #[test]
    fn test_non_get_rejected() {
        let result = RequestKey::new("POST", "https://example.com/");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_query_is_part_of_identity() {
        let a = RequestKey::get("https://example.com/?page=1").unwrap();
        let b = RequestKey::get("https://example.com/?page=2").unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_format() {
        let hash = RequestKey::get("https://example.com/").unwrap().hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_display() {
        let key = RequestKey::get("https://example.com/data").unwrap();
        assert_eq!(key.to_string(), "GET https://example.com/data");
    }
}
