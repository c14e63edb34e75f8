//! Listener registry for broadcasting store changes.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use super::types::{ChangeConfig, ChangeEvent, ChangeHandle, DropReason, ListenerId};

/// Internal listener state.
struct Listener {
    config: ChangeConfig,
    sender: Sender<ChangeEvent>,
}

impl Listener {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (listener will be dropped).
    fn try_send(&self, event: ChangeEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Manages change listeners and broadcasts events.
pub struct ChangeManager {
    /// Active listeners by ID.
    listeners: RwLock<HashMap<ListenerId, Listener>>,
    /// Counter for generating listener IDs.
    next_id: AtomicU64,
}

impl ChangeManager {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener.
    pub fn watch(&self, config: ChangeConfig) -> ChangeHandle {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.listeners
            .write()
            .insert(id, Listener { config, sender });

        ChangeHandle { id, receiver }
    }

    /// Remove a listener.
    pub fn unwatch(&self, id: ListenerId) {
        if let Some(listener) = self.listeners.write().remove(&id) {
            // Best effort
            let _ = listener.sender.try_send(ChangeEvent::Dropped {
                reason: DropReason::Unwatched,
            });
        }
    }

    /// Drop every listener, telling each why.
    pub fn close_all(&self, reason: DropReason) {
        let drained: Vec<Listener> = self.listeners.write().drain().map(|(_, l)| l).collect();
        for listener in drained {
            let _ = listener.sender.try_send(ChangeEvent::Dropped { reason });
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Send an event to every interested listener. Drops listeners that
    /// fail to receive.
    pub fn broadcast(&self, event: ChangeEvent) {
        let mut to_remove = Vec::new();

        {
            let listeners = self.listeners.read();
            for (id, listener) in listeners.iter() {
                if listener.config.filter.matches(&event) && !listener.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut listeners = self.listeners.write();
            for id in to_remove {
                if let Some(listener) = listeners.remove(&id) {
                    warn!(listener = id.0, "dropping slow change listener");
                    let _ = listener.sender.try_send(ChangeEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for ChangeManager {
    fn default() -> Self {
        Self::new()
    }
}
