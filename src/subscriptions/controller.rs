//! Owns the single push subscription of a live store.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::gateway::{
    todos_from_documents, Constraint, Document, DocumentGateway, SnapshotListener, Unsubscribe,
};
use crate::types::Todo;

/// Receiver of decoded pushes. Implemented by the store.
///
/// `epoch` identifies the subscription a push came from; the receiver must
/// check it with [`SubscriptionController::is_current`] under its own lock
/// before applying anything.
pub trait SnapshotSink: Send + Sync {
    fn apply_snapshot(&self, epoch: u64, todos: Vec<Todo>);

    fn channel_error(&self, epoch: u64, error: StoreError);

    /// The backend ended the subscription; the controller is already idle.
    fn channel_closed(&self, reason: Option<StoreError>);
}

/// Observable controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribed,
}

enum Slot {
    Idle,
    /// Gateway call in progress.
    Starting(u64),
    Subscribed { epoch: u64, handle: Unsubscribe },
}

impl Slot {
    fn epoch(&self) -> Option<u64> {
        match self {
            Slot::Idle => None,
            Slot::Starting(epoch) | Slot::Subscribed { epoch, .. } => Some(*epoch),
        }
    }
}

struct Shared {
    slot: Mutex<Slot>,
    /// Epoch allowed to deliver; 0 when idle.
    live_epoch: AtomicU64,
}

impl Shared {
    /// Backend-side termination. Returns whether `epoch` was the live one.
    fn close(&self, epoch: u64) -> bool {
        if self
            .live_epoch
            .compare_exchange(epoch, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let old = {
            let mut slot = self.slot.lock();
            if slot.epoch() == Some(epoch) {
                std::mem::replace(&mut *slot, Slot::Idle)
            } else {
                Slot::Idle
            }
        };
        // Dropping the handle outside the lock; it may call into the gateway.
        drop(old);
        true
    }
}

/// Idle/subscribed state machine holding at most one gateway subscription.
pub struct SubscriptionController {
    gateway: Arc<dyn DocumentGateway>,
    collection: String,
    constraints: Vec<Constraint>,
    shared: Arc<Shared>,
    next_epoch: AtomicU64,
}

impl SubscriptionController {
    pub fn new(
        gateway: Arc<dyn DocumentGateway>,
        collection: impl Into<String>,
        constraints: Vec<Constraint>,
    ) -> Self {
        Self {
            gateway,
            collection: collection.into(),
            constraints,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Idle),
                live_epoch: AtomicU64::new(0),
            }),
            next_epoch: AtomicU64::new(1),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn state(&self) -> SubscriptionState {
        match *self.shared.slot.lock() {
            Slot::Idle => SubscriptionState::Idle,
            Slot::Starting(_) | Slot::Subscribed { .. } => SubscriptionState::Subscribed,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.state() == SubscriptionState::Subscribed
    }

    /// Whether pushes tagged `epoch` may still be applied.
    pub fn is_current(&self, epoch: u64) -> bool {
        epoch != 0 && self.shared.live_epoch.load(Ordering::SeqCst) == epoch
    }

    /// Open the subscription. Returns `Ok(false)` if one is already open.
    pub fn start(&self, sink: Weak<dyn SnapshotSink>) -> Result<bool> {
        let epoch = {
            let mut slot = self.shared.slot.lock();
            if !matches!(*slot, Slot::Idle) {
                debug!(collection = %self.collection, "already subscribed");
                return Ok(false);
            }
            let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
            *slot = Slot::Starting(epoch);
            self.shared.live_epoch.store(epoch, Ordering::SeqCst);
            epoch
        };

        let relay = Arc::new(Relay {
            epoch,
            shared: Arc::downgrade(&self.shared),
            sink,
        });

        match self
            .gateway
            .subscribe_collection(&self.collection, &self.constraints, relay)
        {
            Ok(handle) => {
                let mut slot = self.shared.slot.lock();
                if matches!(*slot, Slot::Starting(e) if e == epoch) {
                    *slot = Slot::Subscribed { epoch, handle };
                    info!(collection = %self.collection, epoch, "subscribed");
                } else {
                    // Stopped or closed by the backend while starting.
                    drop(slot);
                    handle.cancel();
                    debug!(collection = %self.collection, epoch, "subscription ended while starting");
                }
                Ok(true)
            }
            Err(e) => {
                let _ = self.shared.live_epoch.compare_exchange(
                    epoch,
                    0,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                let mut slot = self.shared.slot.lock();
                if slot.epoch() == Some(epoch) {
                    *slot = Slot::Idle;
                }
                warn!(collection = %self.collection, error = %e, "subscribe failed");
                Err(e)
            }
        }
    }

    /// Cancel the subscription. Returns whether one was open.
    pub fn stop(&self) -> bool {
        self.shared.live_epoch.store(0, Ordering::SeqCst);
        let old = std::mem::replace(&mut *self.shared.slot.lock(), Slot::Idle);
        match old {
            Slot::Idle => false,
            Slot::Starting(_) => true,
            Slot::Subscribed { epoch, handle } => {
                handle.cancel();
                info!(collection = %self.collection, epoch, "unsubscribed");
                true
            }
        }
    }
}

impl Drop for SubscriptionController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Gateway listener for one epoch. Holds only weak references.
struct Relay {
    epoch: u64,
    shared: Weak<Shared>,
    sink: Weak<dyn SnapshotSink>,
}

impl Relay {
    fn is_live(&self) -> bool {
        self.shared
            .upgrade()
            .map(|s| s.live_epoch.load(Ordering::SeqCst) == self.epoch)
            .unwrap_or(false)
    }
}

impl SnapshotListener for Relay {
    fn on_snapshot(&self, docs: Vec<Document>) {
        if !self.is_live() {
            debug!(epoch = self.epoch, "discarding snapshot from stale subscription");
            return;
        }
        if let Some(sink) = self.sink.upgrade() {
            sink.apply_snapshot(self.epoch, todos_from_documents(&docs));
        }
    }

    fn on_error(&self, error: StoreError) {
        if !self.is_live() {
            return;
        }
        if let Some(sink) = self.sink.upgrade() {
            sink.channel_error(self.epoch, error);
        }
    }

    fn on_closed(&self, reason: Option<StoreError>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if shared.close(self.epoch) {
            info!(epoch = self.epoch, "subscription closed by backend");
            if let Some(sink) = self.sink.upgrade() {
                sink.channel_closed(reason);
            }
        }
    }
}
