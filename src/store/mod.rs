pub mod consul;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use consul::ConsulStore;
pub use memory::MemoryStore;

/// An entry read from the KV store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    /// Key as reported by the backend; backends disagree on leading and
    /// trailing slashes, so consumers compare normalized keys only.
    pub key: String,
    pub value: Vec<u8>,
    /// Incremented by the store on every mutation of this key.
    pub modify_index: u64,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, modify_index: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            modify_index,
        }
    }
}

/// A query forwarded by the frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub record_type: String,
}

/// One resource record produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub record_type: String,
    pub ttl: u32,
    pub payload: String,
}

/// The four store operations the backend needs. Implemented by the real
/// Consul adapter and by the in-memory store used in tests.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a single key. Returns `BackendError::KeyNotFound` when absent.
    async fn get(&self, key: &str) -> Result<Pair>;

    /// Unconditionally write a key.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// List all pairs under a prefix. Order is unspecified.
    async fn list(&self, prefix: &str) -> Result<Vec<Pair>>;

    /// Compare-and-swap write. Applies iff the stored modify-index equals
    /// `previous.modify_index`, or `previous` is `None` and the key does
    /// not exist yet. A `false` return is a version conflict, not an error.
    async fn atomic_put(&self, key: &str, value: &[u8], previous: Option<&Pair>) -> Result<bool>;
}

/// Strips one leading and one trailing `/` from a key, never more:
/// `//a/b//` normalizes to `/a/b/`.
pub fn normalize_key(key: &str) -> &str {
    let key = key.strip_prefix('/').unwrap_or(key);
    key.strip_suffix('/').unwrap_or(key)
}

/// Instantiates the KV store named by the configuration.
pub fn new_store(backend: &str, address: &str) -> Result<Arc<dyn KvStore>> {
    match backend {
        "consul" => Ok(Arc::new(ConsulStore::new(address)?)),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(crate::error::BackendError::UnsupportedBackend(
            other.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        let cases = [
            ("a/b", "a/b"),
            ("/a/b", "a/b"),
            ("/a/b/", "a/b"),
            ("//a/b//", "/a/b/"),
            ("", ""),
            ("/", ""),
        ];

        for (input, expected) in cases {
            assert_eq!(normalize_key(input), expected, "normalize_key({input:?})");
        }
    }

    #[test]
    fn test_normalize_key_is_idempotent() {
        for key in ["a/b", "/a/b/", "//a/b//", "zones/example.com/A/", ""] {
            let once = normalize_key(key);
            assert_eq!(normalize_key(once), once);
        }
    }

    #[test]
    fn test_new_store_rejects_unknown_backend() {
        assert!(new_store("zookeeper", "127.0.0.1:2181").is_err());
    }
}
