use crate::error::Result;
use crate::storage::TodoPersistence;
use crate::types::Todo;
use tracing::debug;

/// Local persisted cache.
pub struct OfflineBackend {
    persistence: TodoPersistence,
}

impl OfflineBackend {
    pub fn new(persistence: TodoPersistence) -> Self {
        Self { persistence }
    }

    pub fn persistence(&self) -> &TodoPersistence {
        &self.persistence
    }

    pub fn load(&self) -> Result<Vec<Todo>> {
        let todos = self.persistence.read_all()?;
        debug!(key = self.persistence.key(), count = todos.len(), "loaded todos");
        Ok(todos)
    }

    /// Persist `next`, then make it the current collection.
    ///
    /// `current` is untouched if persisting fails.
    pub fn write_through(&self, current: &mut Vec<Todo>, next: Vec<Todo>) -> Result<()> {
        self.persistence.write_all(&next)?;
        *current = next;
        Ok(())
    }
}
