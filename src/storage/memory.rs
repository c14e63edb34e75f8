//! In-memory key-value storage.

use crate::error::{Result, StoreError};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::KeyValueStorage;

/// Process-local storage with an optional byte quota.
///
/// A write that would push the total size of all values past the quota is
/// rejected and leaves the previous value in place.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    quota: RwLock<Option<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes beyond `quota` bytes in total.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: RwLock::new(Some(quota)),
        }
    }

    pub fn set_quota(&self, quota: Option<usize>) {
        *self.quota.write() = quota;
    }

    /// Total bytes held across all keys.
    pub fn used_bytes(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(quota) = *self.quota.read() {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + value.len() > quota {
                return Err(StoreError::OperationFailed(format!(
                    "storage quota of {} bytes exceeded",
                    quota
                )));
            }
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}
