use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{KvStore, Pair};
use crate::error::{BackendError, Result};

/// In-memory store with the same modify-index semantics as the real
/// backends. Backs the `memory` backend and the test suite.
///
/// Keys are stored verbatim; normalization is the consumer's concern.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, (Vec<u8>, u64)>>,
    counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a key with an explicit modify-index, keeping the internal
    /// counter ahead of it so later writes stay monotonic.
    pub fn put_with_index(&self, key: &str, value: &[u8], modify_index: u64) {
        self.counter.fetch_max(modify_index, Ordering::SeqCst);
        self.entries
            .write()
            .insert(key.to_string(), (value.to_vec(), modify_index));
    }

    fn next_index(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Pair> {
        let entries = self.entries.read();
        match entries.get(key) {
            Some((value, index)) => Ok(Pair::new(key, value.clone(), *index)),
            None => Err(BackendError::KeyNotFound),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let index = self.next_index();
        self.entries
            .write()
            .insert(key.to_string(), (value.to_vec(), index));
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Pair>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (value, index))| Pair::new(key.clone(), value.clone(), *index))
            .collect())
    }

    async fn atomic_put(&self, key: &str, value: &[u8], previous: Option<&Pair>) -> Result<bool> {
        let mut entries = self.entries.write();
        let applied = match (entries.get(key), previous) {
            (None, None) => true,
            (Some((_, index)), Some(prev)) => *index == prev.modify_index,
            _ => false,
        };

        if applied {
            let index = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            entries.insert(key.to_string(), (value.to_vec(), index));
        }

        Ok(applied)
    }
}
