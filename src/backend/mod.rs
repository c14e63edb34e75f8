//! The two consistency strategies behind [`crate::TodoStore`].
//!
//! - [`OfflineBackend`]: a persisted local cache. Mutations are applied
//!   write-through and visible immediately.
//! - [`LiveBackend`]: the remote gateway. Mutations are requests; the
//!   collection only changes when the push subscription delivers a snapshot.

mod live;
mod offline;

pub use live::LiveBackend;
pub use offline::OfflineBackend;

use crate::types::StoreMode;

/// Backend chosen once at store construction.
pub(crate) enum Backend {
    Offline(OfflineBackend),
    Live(LiveBackend),
}

impl Backend {
    pub(crate) fn mode(&self) -> StoreMode {
        match self {
            Backend::Offline(_) => StoreMode::Offline,
            Backend::Live(_) => StoreMode::Live,
        }
    }
}
