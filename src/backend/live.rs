use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::gateway::{new_todo_fields, patch_fields, todos_from_documents, Constraint, DocumentGateway};
use crate::subscriptions::SubscriptionController;
use crate::types::{NewTodo, Todo, TodoId, TodoPatch};

/// Remote gateway plus the push subscription for one collection.
pub struct LiveBackend {
    gateway: Arc<dyn DocumentGateway>,
    collection: String,
    constraints: Vec<Constraint>,
    controller: SubscriptionController,
}

impl LiveBackend {
    pub fn new(
        gateway: Arc<dyn DocumentGateway>,
        collection: impl Into<String>,
        constraints: Vec<Constraint>,
    ) -> Self {
        let collection = collection.into();
        let controller =
            SubscriptionController::new(Arc::clone(&gateway), collection.clone(), constraints.clone());
        Self {
            gateway,
            collection,
            constraints,
            controller,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn controller(&self) -> &SubscriptionController {
        &self.controller
    }

    pub async fn load(&self) -> Result<Vec<Todo>> {
        let docs = self
            .gateway
            .list_all(&self.collection, &self.constraints)
            .await?;
        debug!(collection = %self.collection, count = docs.len(), "fetched documents");
        Ok(todos_from_documents(&docs))
    }

    pub async fn create(&self, todo: &NewTodo, created_at: DateTime<Utc>) -> Result<TodoId> {
        let id = self
            .gateway
            .create(&self.collection, new_todo_fields(todo, created_at))
            .await?;
        debug!(collection = %self.collection, %id, "created document");
        Ok(TodoId(id))
    }

    pub async fn update(&self, id: &TodoId, patch: &TodoPatch) -> Result<()> {
        let accepted = self
            .gateway
            .update_fields(&self.collection, id.as_str(), patch_fields(patch))
            .await?;
        if accepted {
            Ok(())
        } else {
            Err(StoreError::OperationFailed(format!("update of {} was rejected", id)))
        }
    }

    pub async fn delete(&self, id: &TodoId) -> Result<()> {
        let accepted = self.gateway.delete(&self.collection, id.as_str()).await?;
        if accepted {
            Ok(())
        } else {
            Err(StoreError::OperationFailed(format!("delete of {} was rejected", id)))
        }
    }
}
