//! Change notification types.

use crate::error::ErrorKind;
use crate::types::{Filter, SortOrder};
use serde::{Deserialize, Serialize};

/// Configuration for a change listener.
#[derive(Clone, Debug)]
pub struct ChangeConfig {
    /// Max buffered events before dropping the listener.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: ChangeFilter,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: ChangeFilter::all(),
        }
    }
}

/// Which event groups a listener wants.
#[derive(Clone, Debug, Default)]
pub struct ChangeFilter {
    /// Collection replacements.
    pub include_collection: bool,

    /// Filter and sort changes.
    pub include_view: bool,

    /// Loading, error and subscription state.
    pub include_status: bool,
}

impl ChangeFilter {
    pub fn collection() -> Self {
        Self {
            include_collection: true,
            ..Default::default()
        }
    }

    pub fn view() -> Self {
        Self {
            include_view: true,
            ..Default::default()
        }
    }

    pub fn status() -> Self {
        Self {
            include_status: true,
            ..Default::default()
        }
    }

    pub fn all() -> Self {
        Self {
            include_collection: true,
            include_view: true,
            include_status: true,
        }
    }

    pub(crate) fn matches(&self, event: &ChangeEvent) -> bool {
        match event.group() {
            EventGroup::Collection => self.include_collection,
            EventGroup::View => self.include_view,
            EventGroup::Status => self.include_status,
            EventGroup::Lifecycle => true,
        }
    }
}

/// Why the collection was replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Load,
    Mutation,
    Snapshot,
    Unsubscribe,
}

/// Events emitted by a store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    // --- Collection ---
    /// The collection changed; re-read it and any projections.
    CollectionChanged { source: ChangeSource, total: usize },

    // --- View ---
    FilterChanged { filter: Filter },
    SortChanged { sort: SortOrder },

    // --- Status ---
    LoadingChanged { loading: bool },
    /// `None` when the error was cleared.
    ErrorChanged {
        kind: Option<ErrorKind>,
        message: Option<String>,
    },
    SubscriptionChanged { subscribed: bool },

    // --- Lifecycle ---
    /// The listener was dropped. No further events follow.
    Dropped { reason: DropReason },
}

pub(crate) enum EventGroup {
    Collection,
    View,
    Status,
    Lifecycle,
}

impl ChangeEvent {
    pub(crate) fn group(&self) -> EventGroup {
        match self {
            ChangeEvent::CollectionChanged { .. } => EventGroup::Collection,
            ChangeEvent::FilterChanged { .. } | ChangeEvent::SortChanged { .. } => {
                EventGroup::View
            }
            ChangeEvent::LoadingChanged { .. }
            | ChangeEvent::ErrorChanged { .. }
            | ChangeEvent::SubscriptionChanged { .. } => EventGroup::Status,
            ChangeEvent::Dropped { .. } => EventGroup::Lifecycle,
        }
    }
}

/// Why a listener was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unwatched.
    Unwatched,
    /// The store was disposed.
    Disposed,
}

/// Unique identifier for a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Handle for receiving change events.
pub struct ChangeHandle {
    pub id: ListenerId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<ChangeEvent>,
}

impl ChangeHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ChangeEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ChangeEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.receiver.try_iter().collect()
    }
}
