//! In-process document gateway.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use super::{
    apply_constraints, Constraint, Document, DocumentGateway, Fields, SnapshotListener,
    Unsubscribe,
};
use crate::error::{Result, StoreError};

/// Gateway operations, for failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Get,
    List,
    Create,
    Update,
    Delete,
    Subscribe,
}

struct Failure {
    op: GatewayOp,
    doc_id: Option<String>,
    message: String,
}

struct Listener {
    collection: String,
    constraints: Vec<Constraint>,
    listener: Arc<dyn SnapshotListener>,
}

#[derive(Default)]
struct Shared {
    collections: RwLock<BTreeMap<String, BTreeMap<String, Fields>>>,
    listeners: RwLock<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
    opened: AtomicUsize,
    failures: Mutex<Vec<Failure>>,
    unavailable: AtomicBool,
}

/// A document store held in memory, with push subscriptions.
///
/// Every write delivers a full snapshot to each matching listener, and a
/// new subscription receives the current snapshot immediately, the way a
/// hosted document database behaves. Failures can be injected per
/// operation to exercise error paths.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    shared: Arc<Shared>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op` with `OperationFailed(message)`.
    pub fn fail_next(&self, op: GatewayOp, message: impl Into<String>) {
        self.shared.failures.lock().push(Failure {
            op,
            doc_id: None,
            message: message.into(),
        });
    }

    /// Fail the next call of `op` that targets document `id`.
    pub fn fail_document(&self, op: GatewayOp, id: impl Into<String>, message: impl Into<String>) {
        self.shared.failures.lock().push(Failure {
            op,
            doc_id: Some(id.into()),
            message: message.into(),
        });
    }

    /// Simulate an uninitialized backend.
    pub fn set_available(&self, available: bool) {
        self.shared.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Write a document directly, as another client would.
    pub fn put_document(&self, collection: &str, doc: Document) {
        self.shared
            .collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id, doc.data);
        self.notify(collection);
    }

    /// Current documents of a collection, ordered by id.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.snapshot(collection, &[])
    }

    /// Push a transient error to every listener on `collection`.
    pub fn emit_error(&self, collection: &str, message: &str) {
        for listener in self.listeners_for(collection) {
            listener
                .listener
                .on_error(StoreError::OperationFailed(message.to_string()));
        }
    }

    /// End every subscription on `collection` from the backend side.
    pub fn close_subscriptions(&self, collection: &str, reason: Option<&str>) {
        let closed: Vec<Arc<dyn SnapshotListener>> = {
            let mut listeners = self.shared.listeners.write();
            let ids: Vec<u64> = listeners
                .iter()
                .filter(|(_, l)| l.collection == collection)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| listeners.remove(&id))
                .map(|l| l.listener)
                .collect()
        };
        for listener in closed {
            listener.on_closed(reason.map(|r| StoreError::OperationFailed(r.to_string())));
        }
    }

    /// Number of currently open subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.shared.listeners.read().len()
    }

    /// Number of subscriptions ever opened.
    pub fn subscriptions_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    fn check(&self, op: GatewayOp, doc_id: Option<&str>) -> Result<()> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::BackendUnavailable(
                "document store not initialized".into(),
            ));
        }
        let mut failures = self.shared.failures.lock();
        let hit = failures.iter().position(|f| {
            f.op == op
                && match (&f.doc_id, doc_id) {
                    (None, _) => true,
                    (Some(want), Some(got)) => want == got,
                    (Some(_), None) => false,
                }
        });
        match hit {
            Some(index) => Err(StoreError::OperationFailed(failures.remove(index).message)),
            None => Ok(()),
        }
    }

    fn snapshot(&self, collection: &str, constraints: &[Constraint]) -> Vec<Document> {
        let docs = self
            .shared
            .collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        apply_constraints(docs, constraints)
    }

    fn listeners_for(&self, collection: &str) -> Vec<Listener> {
        self.shared
            .listeners
            .read()
            .values()
            .filter(|l| l.collection == collection)
            .map(|l| Listener {
                collection: l.collection.clone(),
                constraints: l.constraints.clone(),
                listener: Arc::clone(&l.listener),
            })
            .collect()
    }

    /// Deliver the current snapshot to every listener on `collection`.
    /// Called with no locks held; listeners may call back into the gateway.
    fn notify(&self, collection: &str) {
        for l in self.listeners_for(collection) {
            let docs = self.snapshot(collection, &l.constraints);
            l.listener.on_snapshot(docs);
        }
    }
}

#[async_trait]
impl DocumentGateway for MemoryGateway {
    async fn get_one(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.check(GatewayOp::Get, Some(id))?;
        Ok(self
            .shared
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn list_all(&self, collection: &str, constraints: &[Constraint]) -> Result<Vec<Document>> {
        self.check(GatewayOp::List, None)?;
        Ok(self.snapshot(collection, constraints))
    }

    async fn create(&self, collection: &str, mut fields: Fields) -> Result<String> {
        self.check(GatewayOp::Create, None)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = json!(Utc::now().to_rfc3339());
        fields.entry("createdAt").or_insert_with(|| now.clone());
        fields.insert("updatedAt".into(), now);
        self.shared
            .collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        debug!(collection, id = %id, "created document");
        self.notify(collection);
        Ok(id)
    }

    async fn update_fields(&self, collection: &str, id: &str, fields: Fields) -> Result<bool> {
        self.check(GatewayOp::Update, Some(id))?;
        {
            let mut collections = self.shared.collections.write();
            let Some(doc) = collections.get_mut(collection).and_then(|docs| docs.get_mut(id))
            else {
                return Err(StoreError::OperationFailed(format!(
                    "no document to update: {}/{}",
                    collection, id
                )));
            };
            for (key, value) in fields {
                doc.insert(key, value);
            }
            doc.insert("updatedAt".into(), json!(Utc::now().to_rfc3339()));
        }
        self.notify(collection);
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        self.check(GatewayOp::Delete, Some(id))?;
        let removed = self
            .shared
            .collections
            .write()
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            self.notify(collection);
        }
        // Deleting a missing document succeeds, as in hosted document stores.
        Ok(true)
    }

    fn subscribe_collection(
        &self,
        collection: &str,
        constraints: &[Constraint],
        listener: Arc<dyn SnapshotListener>,
    ) -> Result<Unsubscribe> {
        self.check(GatewayOp::Subscribe, None)?;

        let id = self.shared.next_listener.fetch_add(1, Ordering::SeqCst);
        self.shared.listeners.write().insert(
            id,
            Listener {
                collection: collection.to_string(),
                constraints: constraints.to_vec(),
                listener: Arc::clone(&listener),
            },
        );
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        debug!(collection, listener = id, "opened subscription");

        listener.on_snapshot(self.snapshot(collection, constraints));

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Ok(Unsubscribe::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.listeners.write().remove(&id);
            }
        }))
    }
}
