//! The reactive todo store.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::backend::{Backend, LiveBackend, OfflineBackend};
use crate::error::{ErrorKind, Result, StoreError};
use crate::gateway::{Constraint, DocumentGateway};
use crate::projection::{self, Counts};
use crate::storage::{KeyValueStorage, TodoPersistence, DEFAULT_STORAGE_KEY};
use crate::subscriptions::{
    ChangeConfig, ChangeEvent, ChangeHandle, ChangeManager, ChangeSource, DropReason, ListenerId,
    SnapshotSink,
};
use crate::types::{
    Filter, Identity, NewTodo, Priority, SortOrder, StoreMode, Todo, TodoId, TodoPatch,
};
use crate::validation::{CreateTodoInput, Validate};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Key the offline collection is persisted under.
    pub storage_key: String,

    /// Root of per-user collections: `{collection_root}/{uid}/todos`.
    pub collection_root: String,

    /// Query constraints for live loads and the push subscription.
    pub constraints: Vec<Constraint>,

    /// Listener buffer size used by [`TodoStore::watch_all`].
    pub change_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            collection_root: "users".to_string(),
            constraints: Vec::new(),
            change_buffer_size: 256,
        }
    }
}

impl StoreConfig {
    /// Collection path observed for `identity`.
    pub fn collection_for(&self, identity: &Identity) -> String {
        format!("{}/{}/todos", self.collection_root, identity.uid)
    }
}

/// Store operations, as attributed in [`LastError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Load,
    Add,
    Update,
    Remove,
    ClearCompleted,
    Subscribe,
}

/// The most recent failure.
///
/// Stays until [`TodoStore::clear_error`], a newer failure, or a later
/// success of the same operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub operation: Operation,
    pub kind: ErrorKind,
    pub message: String,
}

struct State {
    todos: Vec<Todo>,
    filter: Filter,
    sort: SortOrder,
    loading: bool,
    last_error: Option<LastError>,
    disposed: bool,
}

struct Inner {
    backend: Backend,
    state: Mutex<State>,
    changes: ChangeManager,
    change_buffer_size: usize,
}

/// A todo collection kept in sync with its backend.
///
/// Cheap to clone; clones share state. Operations never return errors:
/// they return `false` and record the failure, readable through
/// [`TodoStore::last_error`]. Changes are observable through
/// [`TodoStore::watch`].
///
/// ```ignore
/// let store = TodoStore::offline(Arc::new(MemoryStorage::new()), StoreConfig::default());
/// store.load().await;
/// store.add_text("Buy milk", Priority::High).await;
/// store.set_filter(Filter::Active);
/// for todo in store.filtered_todos() {
///     println!("{}", todo.text);
/// }
/// ```
#[derive(Clone)]
pub struct TodoStore {
    inner: Arc<Inner>,
}

impl TodoStore {
    /// A store over a local persisted cache.
    pub fn offline(storage: Arc<dyn KeyValueStorage>, config: StoreConfig) -> Self {
        let persistence = TodoPersistence::new(storage, config.storage_key.clone());
        info!(key = %config.storage_key, "opening offline todo store");
        Self::with_backend(Backend::Offline(OfflineBackend::new(persistence)), &config)
    }

    /// A store over the remote collection at `collection`.
    pub fn live(
        gateway: Arc<dyn DocumentGateway>,
        collection: impl Into<String>,
        config: StoreConfig,
    ) -> Self {
        let backend = LiveBackend::new(gateway, collection, config.constraints.clone());
        info!(collection = backend.collection(), "opening live todo store");
        Self::with_backend(Backend::Live(backend), &config)
    }

    /// A live store over the collection owned by `identity`.
    pub fn live_for(
        gateway: Arc<dyn DocumentGateway>,
        identity: &Identity,
        config: StoreConfig,
    ) -> Self {
        let collection = config.collection_for(identity);
        Self::live(gateway, collection, config)
    }

    fn with_backend(backend: Backend, config: &StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                state: Mutex::new(State {
                    todos: Vec::new(),
                    filter: Filter::default(),
                    sort: SortOrder::default(),
                    loading: false,
                    last_error: None,
                    disposed: false,
                }),
                changes: ChangeManager::new(),
                change_buffer_size: config.change_buffer_size,
            }),
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.inner.backend.mode()
    }

    // =========================================================================
    // Read side
    // =========================================================================

    /// The whole collection, in collection order.
    pub fn todos(&self) -> Vec<Todo> {
        self.inner.state.lock().todos.clone()
    }

    pub fn get(&self, id: &TodoId) -> Option<Todo> {
        self.inner
            .state
            .lock()
            .todos
            .iter()
            .find(|t| &t.id == id)
            .cloned()
    }

    /// The collection under the current filter and sort order.
    pub fn filtered_todos(&self) -> Vec<Todo> {
        let state = self.inner.state.lock();
        projection::project(&state.todos, state.filter, state.sort)
    }

    pub fn counts(&self) -> Counts {
        Counts::of(&self.inner.state.lock().todos)
    }

    pub fn total_count(&self) -> usize {
        self.counts().total
    }

    pub fn active_count(&self) -> usize {
        self.counts().active
    }

    pub fn completed_count(&self) -> usize {
        self.counts().completed
    }

    pub fn completion_percentage(&self) -> u8 {
        self.counts().completion_percentage()
    }

    pub fn filter(&self) -> Filter {
        self.inner.state.lock().filter
    }

    pub fn sort(&self) -> SortOrder {
        self.inner.state.lock().sort
    }

    pub fn set_filter(&self, filter: Filter) {
        let mut state = self.inner.state.lock();
        if state.disposed || state.filter == filter {
            return;
        }
        state.filter = filter;
        self.inner.emit(ChangeEvent::FilterChanged { filter });
    }

    pub fn set_sort(&self, sort: SortOrder) {
        let mut state = self.inner.state.lock();
        if state.disposed || state.sort == sort {
            return;
        }
        state.sort = sort;
        self.inner.emit(ChangeEvent::SortChanged { sort });
    }

    /// Back to showing everything, newest first.
    pub fn reset_view(&self) {
        self.set_filter(Filter::default());
        self.set_sort(SortOrder::default());
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        let mut state = self.inner.state.lock();
        if state.last_error.take().is_some() {
            self.inner.emit(ChangeEvent::ErrorChanged {
                kind: None,
                message: None,
            });
        }
    }

    pub fn is_subscribed(&self) -> bool {
        match &self.inner.backend {
            Backend::Live(live) => live.controller().is_subscribed(),
            Backend::Offline(_) => false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Register a listener for every change, buffered per the store config.
    pub fn watch_all(&self) -> ChangeHandle {
        self.watch(ChangeConfig {
            buffer_size: self.inner.change_buffer_size,
            ..Default::default()
        })
    }

    /// Register a change listener. A disposed store hands back a handle
    /// that is already closed.
    pub fn watch(&self, config: ChangeConfig) -> ChangeHandle {
        let handle = self.inner.changes.watch(config);
        if self.is_disposed() {
            self.inner.changes.close_all(DropReason::Disposed);
        }
        handle
    }

    pub fn unwatch(&self, id: ListenerId) {
        self.inner.changes.unwatch(id);
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Fetch the whole collection once, replacing what is held.
    ///
    /// On failure the previous collection is kept.
    pub async fn load(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return false;
            }
            self.inner.set_loading(&mut state, true);
        }

        let result = match &self.inner.backend {
            Backend::Offline(offline) => offline.load(),
            Backend::Live(live) => live.load().await,
        };

        let Some(mut state) = self.inner.lock_live() else {
            return false;
        };
        self.inner.set_loading(&mut state, false);
        match result {
            Ok(todos) => {
                info!(count = todos.len(), "loaded todos");
                state.todos = todos;
                self.inner.emit_collection(&state, ChangeSource::Load);
                self.inner.succeed(&mut state, Operation::Load);
                true
            }
            Err(e) => {
                self.inner.fail(&mut state, Operation::Load, e);
                false
            }
        }
    }

    /// Add a validated todo.
    ///
    /// Offline, the todo is visible on return. Live, it arrives with the
    /// next snapshot.
    pub async fn add(&self, todo: NewTodo) -> bool {
        if self.is_disposed() {
            return false;
        }
        let result = match &self.inner.backend {
            Backend::Offline(offline) => self.inner.add_offline(offline, todo),
            Backend::Live(live) => live.create(&todo, Utc::now()).await.map(|_| ()),
        };
        self.inner.settle(Operation::Add, result)
    }

    /// Validate raw text and add it. Nothing reaches the backend if the
    /// text is blank.
    pub async fn add_text(&self, text: &str, priority: Priority) -> bool {
        match CreateTodoInput::new(text).with_priority(priority).validate() {
            Ok(todo) => self.add(todo).await,
            Err(errors) => self
                .inner
                .settle(Operation::Add, Err(StoreError::Validation(errors))),
        }
    }

    /// Apply a patch to an existing todo.
    ///
    /// An unknown id records `NotFound` before the patch is validated, so a
    /// blank patch against a missing todo still reports the missing todo.
    pub async fn update(&self, id: &TodoId, patch: TodoPatch) -> bool {
        let result = self.update_todo(id, patch).await;
        self.inner.settle(Operation::Update, result)
    }

    pub async fn set_text(&self, id: &TodoId, text: impl Into<String>) -> bool {
        self.update(id, TodoPatch::text(text)).await
    }

    pub async fn set_priority(&self, id: &TodoId, priority: Priority) -> bool {
        self.update(id, TodoPatch::priority(priority)).await
    }

    pub async fn toggle_completed(&self, id: &TodoId) -> bool {
        match self.get(id) {
            Some(todo) => self.update(id, TodoPatch::completed(!todo.completed)).await,
            None => self
                .inner
                .settle(Operation::Update, Err(StoreError::NotFound(id.clone()))),
        }
    }

    pub async fn remove(&self, id: &TodoId) -> bool {
        let result = self.remove_todo(id).await;
        self.inner.settle(Operation::Remove, result)
    }

    /// Remove every completed todo, one request each, concurrently.
    ///
    /// Removals that succeed stay removed even if others fail. Returns
    /// `true` only if all of them succeeded.
    pub async fn clear_completed(&self) -> bool {
        let ids: Vec<TodoId> = {
            let state = self.inner.state.lock();
            if state.disposed {
                return false;
            }
            state
                .todos
                .iter()
                .filter(|t| t.completed)
                .map(|t| t.id.clone())
                .collect()
        };

        let total = ids.len();
        let results = join_all(ids.iter().map(|id| self.remove_todo(id))).await;
        let failures: Vec<StoreError> = results.into_iter().filter_map(|r| r.err()).collect();

        let result = match failures.first() {
            None => {
                debug!(removed = total, "cleared completed todos");
                Ok(())
            }
            Some(first) => Err(StoreError::OperationFailed(format!(
                "failed to clear {} of {} completed todos: {}",
                failures.len(),
                total,
                first
            ))),
        };
        self.inner.settle(Operation::ClearCompleted, result)
    }

    async fn update_todo(&self, id: &TodoId, patch: TodoPatch) -> Result<()> {
        self.inner.ensure_known(id)?;
        let patch = patch.normalized()?;
        match &self.inner.backend {
            Backend::Offline(offline) => self.inner.update_offline(offline, id, &patch),
            Backend::Live(live) => live.update(id, &patch).await,
        }
    }

    async fn remove_todo(&self, id: &TodoId) -> Result<()> {
        match &self.inner.backend {
            Backend::Offline(offline) => self.inner.remove_offline(offline, id),
            Backend::Live(live) => {
                self.inner.ensure_known(id)?;
                live.delete(id).await
            }
        }
    }

    // =========================================================================
    // Subscription lifecycle
    // =========================================================================

    /// Start receiving snapshots of the live collection.
    ///
    /// Returns whether a new subscription was opened and is still open once
    /// `subscribe` returns. Always `false` for an offline store.
    pub fn subscribe(&self) -> bool {
        let Backend::Live(live) = &self.inner.backend else {
            debug!("offline store has no push subscription");
            return false;
        };
        {
            let mut state = self.inner.state.lock();
            if state.disposed || live.controller().is_subscribed() {
                return false;
            }
            self.inner.set_loading(&mut state, true);
        }

        // The gateway may deliver the first snapshot before returning, so
        // the state lock must not be held here.
        let inner: Arc<dyn SnapshotSink> = self.inner.clone();
        let sink: Weak<dyn SnapshotSink> = Arc::downgrade(&inner);
        drop(inner);

        match live.controller().start(sink) {
            Ok(true) => {
                let Some(mut state) = self.inner.lock_live() else {
                    return false;
                };
                // The backend may have closed the channel before start returned.
                let subscribed = live.controller().is_subscribed();
                if subscribed {
                    self.inner.succeed(&mut state, Operation::Subscribe);
                    self.inner
                        .emit(ChangeEvent::SubscriptionChanged { subscribed: true });
                }
                subscribed
            }
            Ok(false) => false,
            Err(e) => {
                if let Some(mut state) = self.inner.lock_live() {
                    self.inner.set_loading(&mut state, false);
                    self.inner.fail(&mut state, Operation::Subscribe, e);
                }
                false
            }
        }
    }

    /// Stop receiving snapshots and clear the collection.
    ///
    /// Returns whether a subscription was active.
    pub fn unsubscribe(&self) -> bool {
        let Backend::Live(live) = &self.inner.backend else {
            return false;
        };
        if !live.controller().stop() {
            return false;
        }
        if let Some(mut state) = self.inner.lock_live() {
            state.todos.clear();
            self.inner.emit_collection(&state, ChangeSource::Unsubscribe);
            self.inner.set_loading(&mut state, false);
            self.inner
                .emit(ChangeEvent::SubscriptionChanged { subscribed: false });
        }
        true
    }

    /// Stop the subscription and close every listener. Later operations are
    /// no-ops. Safe to call more than once.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.loading = false;
        }
        if let Backend::Live(live) = &self.inner.backend {
            live.controller().stop();
        }
        self.inner.changes.close_all(DropReason::Disposed);
        info!(mode = ?self.mode(), "todo store disposed");
    }
}

impl Inner {
    /// Lock the state unless the store was disposed.
    fn lock_live(&self) -> Option<MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.disposed {
            debug!("discarding result after dispose");
            return None;
        }
        Some(state)
    }

    fn emit(&self, event: ChangeEvent) {
        self.changes.broadcast(event);
    }

    fn emit_collection(&self, state: &State, source: ChangeSource) {
        self.emit(ChangeEvent::CollectionChanged {
            source,
            total: state.todos.len(),
        });
    }

    fn set_loading(&self, state: &mut State, loading: bool) {
        if state.loading != loading {
            state.loading = loading;
            self.emit(ChangeEvent::LoadingChanged { loading });
        }
    }

    fn fail(&self, state: &mut State, operation: Operation, error: StoreError) {
        warn!(?operation, error = %error, "todo operation failed");
        let kind = error.kind();
        let message = error.to_string();
        state.last_error = Some(LastError {
            operation,
            kind,
            message: message.clone(),
        });
        self.emit(ChangeEvent::ErrorChanged {
            kind: Some(kind),
            message: Some(message),
        });
    }

    /// Clear the recorded error if it belongs to `operation`.
    fn succeed(&self, state: &mut State, operation: Operation) {
        if matches!(&state.last_error, Some(e) if e.operation == operation) {
            state.last_error = None;
            self.emit(ChangeEvent::ErrorChanged {
                kind: None,
                message: None,
            });
        }
    }

    /// Record the outcome of `operation`. Results arriving after dispose are
    /// dropped without touching state.
    fn settle(&self, operation: Operation, result: Result<()>) -> bool {
        let Some(mut state) = self.lock_live() else {
            return false;
        };
        match result {
            Ok(()) => {
                self.succeed(&mut state, operation);
                true
            }
            Err(e) => {
                self.fail(&mut state, operation, e);
                false
            }
        }
    }

    fn ensure_known(&self, id: &TodoId) -> Result<()> {
        let state = self.state.lock();
        if state.disposed {
            return Err(StoreError::Disposed);
        }
        if state.todos.iter().any(|t| &t.id == id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    fn add_offline(&self, offline: &OfflineBackend, todo: NewTodo) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(StoreError::Disposed);
        }
        let mut next = state.todos.clone();
        next.push(todo.into_todo(TodoId::generate(), Utc::now()));
        offline.write_through(&mut state.todos, next)?;
        self.emit_collection(&state, ChangeSource::Mutation);
        Ok(())
    }

    fn update_offline(
        &self,
        offline: &OfflineBackend,
        id: &TodoId,
        patch: &TodoPatch,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(StoreError::Disposed);
        }
        let index = state
            .todos
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut next = state.todos.clone();
        next[index].apply(patch);
        offline.write_through(&mut state.todos, next)?;
        self.emit_collection(&state, ChangeSource::Mutation);
        Ok(())
    }

    fn remove_offline(&self, offline: &OfflineBackend, id: &TodoId) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(StoreError::Disposed);
        }
        if !state.todos.iter().any(|t| &t.id == id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        let next: Vec<Todo> = state.todos.iter().filter(|t| &t.id != id).cloned().collect();
        offline.write_through(&mut state.todos, next)?;
        self.emit_collection(&state, ChangeSource::Mutation);
        Ok(())
    }

    fn live_backend(&self) -> Option<&LiveBackend> {
        match &self.backend {
            Backend::Live(live) => Some(live),
            Backend::Offline(_) => None,
        }
    }

    /// State lock for a push tagged `epoch`, if it may still be applied.
    fn lock_for_epoch(&self, epoch: u64) -> Option<MutexGuard<'_, State>> {
        let live = self.live_backend()?;
        let state = self.state.lock();
        if state.disposed || !live.controller().is_current(epoch) {
            debug!(epoch, "discarding push from stale subscription");
            return None;
        }
        Some(state)
    }
}

impl SnapshotSink for Inner {
    fn apply_snapshot(&self, epoch: u64, todos: Vec<Todo>) {
        let Some(mut state) = self.lock_for_epoch(epoch) else {
            return;
        };
        debug!(epoch, count = todos.len(), "applying snapshot");
        state.todos = todos;
        self.emit_collection(&state, ChangeSource::Snapshot);
        self.set_loading(&mut state, false);
    }

    fn channel_error(&self, epoch: u64, error: StoreError) {
        let Some(mut state) = self.lock_for_epoch(epoch) else {
            return;
        };
        self.set_loading(&mut state, false);
        self.fail(&mut state, Operation::Subscribe, error);
    }

    fn channel_closed(&self, reason: Option<StoreError>) {
        let Some(mut state) = self.lock_live() else {
            return;
        };
        self.set_loading(&mut state, false);
        if let Some(error) = reason {
            self.fail(&mut state, Operation::Subscribe, error);
        }
        self.emit(ChangeEvent::SubscriptionChanged { subscribed: false });
    }
}
