//! # todo-sync
//!
//! A reactive todo store kept in sync with either a local persisted cache
//! or a remote document store.
//!
//! ## Core Concepts
//!
//! - **Store**: [`TodoStore`] holds the collection, view settings, loading
//!   and error state; every mutation reports success as a `bool`
//! - **Backends**: offline (write-through persistence) or live (gateway
//!   requests plus a push subscription that replaces the collection)
//! - **Projections**: filtered and sorted views computed on every read
//! - **Changes**: [`TodoStore::watch`] streams [`ChangeEvent`]s over a
//!   bounded channel
//!
//! ## Example
//!
//! ```ignore
//! use todo_sync::{Filter, Identity, MemoryGateway, Priority, StoreConfig, TodoStore};
//!
//! let gateway = Arc::new(MemoryGateway::new());
//! let store = TodoStore::live_for(gateway, &Identity::new("alice"), StoreConfig::default());
//!
//! store.subscribe();
//! store.add_text("Buy milk", Priority::High).await;
//! store.set_filter(Filter::Active);
//!
//! let changes = store.watch_all();
//! // ...
//! store.dispose();
//! ```

pub mod backend;
pub mod error;
pub mod gateway;
pub mod projection;
pub mod registry;
pub mod resource;
pub mod storage;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod validation;

// Re-exports
pub use backend::{LiveBackend, OfflineBackend};
pub use error::{ErrorKind, Result, StoreError};
pub use gateway::{
    apply_constraints, Constraint, Direction, Document, DocumentGateway, FieldOp, Fields,
    GatewayOp, MemoryGateway, SnapshotListener, Unsubscribe,
};
pub use projection::{project, sort_todos, Counts};
pub use registry::StoreRegistry;
pub use resource::{ApiResponse, Created, Issue, TodoResource};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, TodoPersistence};
pub use store::{LastError, Operation, StoreConfig, TodoStore};
pub use subscriptions::{
    ChangeConfig, ChangeEvent, ChangeFilter, ChangeHandle, ChangeSource, DropReason, ListenerId,
    SnapshotSink, SubscriptionController, SubscriptionState,
};
pub use types::*;
pub use validation::{
    validate_json, CreateTodoInput, UpdateTodoInput, Validate, ValidationErrors,
};
