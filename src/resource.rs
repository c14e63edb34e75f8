//! Server-side todo resource and its JSON envelope.
//!
//! Uses the same validation and document mapping as the store, so a todo
//! created here is indistinguishable from one created by a live store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::gateway::{
    new_todo_fields, patch_fields, todo_from_document, todos_from_documents, DocumentGateway,
};
use crate::store::StoreConfig;
use crate::types::{Identity, NewTodo, Todo, TodoId};
use crate::validation::{validate_json, CreateTodoInput, UpdateTodoInput, Validate};

/// One field error in an [`ApiResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

/// JSON envelope: `{ ok, data?, error?, issues? }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// HTTP status. Not part of the body.
    #[serde(skip)]
    pub status: u16,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<Issue>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::success(200, data)
    }

    pub fn created(data: T) -> Self {
        Self::success(201, data)
    }

    fn success(status: u16, data: T) -> Self {
        Self {
            status,
            ok: true,
            data: Some(data),
            error: None,
            issues: None,
        }
    }

    pub fn from_error(error: &StoreError) -> Self {
        let (message, issues) = match error.validation_errors() {
            Some(errors) => (
                "Invalid payload".to_string(),
                Some(
                    errors
                        .iter()
                        .map(|(path, message)| Issue {
                            path: path.to_string(),
                            message: message.to_string(),
                        })
                        .collect(),
                ),
            ),
            None => (error.to_string(), None),
        };
        Self {
            status: error.status_code(),
            ok: false,
            data: None,
            error: Some(message),
            issues,
        }
    }

    /// Build from a result, using `status` on success.
    pub fn from_result(result: Result<T>, status: u16) -> Self {
        match result {
            Ok(data) => Self::success(status, data),
            Err(e) => Self::from_error(&e),
        }
    }
}

/// Body of a successful create.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    pub id: TodoId,
}

/// Request/response access to one todo collection.
#[derive(Clone)]
pub struct TodoResource {
    gateway: Arc<dyn DocumentGateway>,
    collection: String,
}

impl TodoResource {
    pub fn new(gateway: Arc<dyn DocumentGateway>, collection: impl Into<String>) -> Self {
        Self {
            gateway,
            collection: collection.into(),
        }
    }

    /// The resource for the collection owned by `identity`.
    pub fn for_identity(
        gateway: Arc<dyn DocumentGateway>,
        identity: &Identity,
        config: &StoreConfig,
    ) -> Self {
        Self::new(gateway, config.collection_for(identity))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn list(&self) -> Result<Vec<Todo>> {
        let docs = self.gateway.list_all(&self.collection, &[]).await?;
        Ok(todos_from_documents(&docs))
    }

    pub async fn get(&self, id: &TodoId) -> Result<Todo> {
        match self.gateway.get_one(&self.collection, id.as_str()).await? {
            Some(doc) => todo_from_document(&doc),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    pub async fn create(&self, input: &CreateTodoInput) -> Result<TodoId> {
        let todo = input.validate()?;
        self.insert(&todo).await
    }

    /// Create from a raw request body.
    pub async fn create_json(&self, body: &Value) -> Result<TodoId> {
        let todo = validate_json::<CreateTodoInput>(body)?;
        self.insert(&todo).await
    }

    async fn insert(&self, todo: &NewTodo) -> Result<TodoId> {
        let id = self
            .gateway
            .create(&self.collection, new_todo_fields(todo, Utc::now()))
            .await?;
        debug!(collection = %self.collection, %id, "created todo");
        Ok(TodoId(id))
    }

    pub async fn update(&self, id: &TodoId, input: &UpdateTodoInput) -> Result<()> {
        let patch = input.validate()?;
        let accepted = self
            .gateway
            .update_fields(&self.collection, id.as_str(), patch_fields(&patch))
            .await?;
        if accepted {
            Ok(())
        } else {
            Err(StoreError::OperationFailed(format!("update of {} was rejected", id)))
        }
    }

    pub async fn remove(&self, id: &TodoId) -> Result<()> {
        if self.gateway.delete(&self.collection, id.as_str()).await? {
            Ok(())
        } else {
            Err(StoreError::OperationFailed(format!("delete of {} was rejected", id)))
        }
    }

    /// `GET` handler.
    pub async fn handle_list(&self) -> ApiResponse<Vec<Todo>> {
        let result = self.list().await;
        if let Err(ref e) = result {
            warn!(collection = %self.collection, error = %e, "list failed");
        }
        ApiResponse::from_result(result, 200)
    }

    /// `POST` handler.
    pub async fn handle_create(&self, body: &Value) -> ApiResponse<Created> {
        let result = self.create_json(body).await.map(|id| Created { id });
        ApiResponse::from_result(result, 201)
    }
}
