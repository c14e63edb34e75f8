//! Local persistence for offline mode.
//!
//! A byte-level key-value interface with two backends: an in-memory map
//! with an optional quota, and a directory of checksummed files.
//! [`TodoPersistence`] stores the whole collection under one key.

mod file;
mod memory;
mod persistence;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use persistence::{TodoPersistence, DEFAULT_STORAGE_KEY};

use crate::error::Result;

/// Durable key-value byte storage.
///
/// Calls are synchronous so the store can persist and commit a mutation
/// without yielding in between.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> Result<bool>;
}
