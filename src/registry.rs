//! Per-scope shared stores.

use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::store::TodoStore;

/// Owns one [`TodoStore`] per scope (a user id, a tab, a test).
///
/// Replaces a process-wide singleton: callers at the composition boundary
/// ask the registry for the store of their scope and share it from there.
#[derive(Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, TodoStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store for `scope`, creating it with `create` on first use.
    ///
    /// `create` runs without the registry lock held. If another caller
    /// inserts a store for the same scope first, the freshly built one is
    /// disposed and the existing one returned.
    pub fn get_or_insert_with<F>(&self, scope: &str, create: F) -> TodoStore
    where
        F: FnOnce() -> TodoStore,
    {
        if let Some(store) = self.get(scope) {
            return store;
        }

        let created = create();
        let existing = match self.stores.write().entry(scope.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                info!(scope, "creating scoped todo store");
                return entry.insert(created).clone();
            }
        };
        debug!(scope, "scope filled concurrently, discarding new store");
        created.dispose();
        existing
    }

    pub fn get(&self, scope: &str) -> Option<TodoStore> {
        self.stores.read().get(scope).cloned()
    }

    /// Remove and dispose the store for `scope`.
    pub fn remove(&self, scope: &str) -> bool {
        let removed = self.stores.write().remove(scope);
        match removed {
            Some(store) => {
                store.dispose();
                true
            }
            None => false,
        }
    }

    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.stores.read().keys().cloned().collect();
        scopes.sort();
        scopes
    }

    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }

    /// Dispose every store and empty the registry.
    pub fn dispose_all(&self) {
        let drained: Vec<TodoStore> = self.stores.write().drain().map(|(_, s)| s).collect();
        for store in drained {
            store.dispose();
        }
    }
}

impl Drop for StoreRegistry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
