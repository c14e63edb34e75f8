//! Whole-collection persistence on top of a key-value backend.

use crate::error::{Result, StoreError};
use crate::types::Todo;
use std::sync::Arc;

use super::KeyValueStorage;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "todos";

/// Reads and writes the full todo collection as one JSON array.
///
/// Timestamps are stored as RFC 3339 strings; records without a
/// `priority` field read back as medium.
#[derive(Clone)]
pub struct TodoPersistence {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl TodoPersistence {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the stored collection. A missing key is an empty collection.
    pub fn read_all(&self) -> Result<Vec<Todo>> {
        match self.storage.get(&self.key)? {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
        }
    }

    pub fn write_all(&self, todos: &[Todo]) -> Result<()> {
        let bytes = serde_json::to_vec(todos)?;
        self.storage.set(&self.key, &bytes)
    }
}
