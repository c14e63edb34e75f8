//! Remote document store seam.
//!
//! [`DocumentGateway`] is the request/response and push-subscription
//! contract of the remote backend. The store only talks to the backend
//! through this trait; [`MemoryGateway`] is an in-process implementation
//! used for tests and local development.

mod document;
mod memory;

pub use document::{new_todo_fields, patch_fields, todo_from_document, todos_from_documents};
pub use memory::{GatewayOp, MemoryGateway};

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Document field map.
pub type Fields = Map<String, Value>;

/// A document as returned by the gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// Comparison used by [`Constraint::Where`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// Query constraint for list and subscribe calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    Where {
        field: String,
        op: FieldOp,
        value: Value,
    },
    OrderBy {
        field: String,
        direction: Direction,
    },
    Limit(usize),
}

impl Constraint {
    pub fn where_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Constraint::Where {
            field: field.into(),
            op: FieldOp::Eq,
            value: value.into(),
        }
    }

    pub fn order_by(field: impl Into<String>, direction: Direction) -> Self {
        Constraint::OrderBy {
            field: field.into(),
            direction,
        }
    }
}

/// Order two JSON values of the same scalar type. Mixed types don't compare.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Apply constraints to a list of documents, in order.
pub fn apply_constraints(mut docs: Vec<Document>, constraints: &[Constraint]) -> Vec<Document> {
    for constraint in constraints {
        match constraint {
            Constraint::Where { field, op, value } => {
                docs.retain(|doc| {
                    let Some(actual) = doc.get(field) else {
                        return false;
                    };
                    let ord = compare_values(actual, value);
                    match op {
                        FieldOp::Eq => actual == value,
                        FieldOp::NotEq => actual != value,
                        FieldOp::Lt => ord == Some(Ordering::Less),
                        FieldOp::Lte => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                        FieldOp::Gt => ord == Some(Ordering::Greater),
                        FieldOp::Gte => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                    }
                });
            }
            Constraint::OrderBy { field, direction } => {
                docs.sort_by(|a, b| {
                    let ord = match (a.get(field), b.get(field)) {
                        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    match direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                });
            }
            Constraint::Limit(n) => docs.truncate(*n),
        }
    }
    docs
}

/// Receives pushes for one collection subscription.
///
/// Callbacks may arrive on any thread, including synchronously from inside
/// [`DocumentGateway::subscribe_collection`].
pub trait SnapshotListener: Send + Sync {
    /// The complete current membership of the collection.
    fn on_snapshot(&self, docs: Vec<Document>);

    /// A transient channel error. The subscription stays open.
    fn on_error(&self, error: StoreError);

    /// The backend ended the subscription. No further callbacks follow.
    fn on_closed(&self, reason: Option<StoreError>);
}

/// Cancel handle for a gateway subscription.
///
/// Cancels when dropped, so a forgotten handle cannot leak a subscription.
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Unsubscribe {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(cancel)))
    }

    /// A handle with nothing to cancel.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn cancel(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("armed", &self.0.is_some())
            .finish()
    }
}

/// The remote document store.
///
/// All request methods are asynchronous and fallible. `Ok(false)` from
/// `update_fields` or `delete` means the backend declined the write.
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    async fn get_one(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn list_all(&self, collection: &str, constraints: &[Constraint])
        -> Result<Vec<Document>>;

    /// Create a document and return its assigned id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String>;

    async fn update_fields(&self, collection: &str, id: &str, fields: Fields) -> Result<bool>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Open a push subscription for a collection.
    fn subscribe_collection(
        &self,
        collection: &str,
        constraints: &[Constraint],
        listener: Arc<dyn SnapshotListener>,
    ) -> Result<Unsubscribe>;
}
