//! Push subscriptions and change notifications.
//!
//! Two halves:
//! - [`SubscriptionController`] owns the one gateway subscription a live
//!   store may hold and relays pushed snapshots into the store.
//! - [`ChangeManager`] fans store changes out to in-process listeners over
//!   bounded channels, dropping listeners that fall behind.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.watch(ChangeConfig {
//!     filter: ChangeFilter::collection(),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(ChangeEvent::CollectionChanged { .. }) => redraw(store.filtered_todos()),
//!         Ok(ChangeEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod controller;
mod manager;
mod types;

pub use controller::{SnapshotSink, SubscriptionController, SubscriptionState};
pub use manager::ChangeManager;
pub use types::{
    ChangeConfig, ChangeEvent, ChangeFilter, ChangeHandle, ChangeSource, DropReason, ListenerId,
};
