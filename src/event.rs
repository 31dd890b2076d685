//! Outbound cache-manager events and outcome translation
//!
//! Every store outcome is folded into one [`Disposition`], and the ones that
//! reach the application become a [`CacheEvent`]. Peer ids are resolved by
//! the caller right before an event is built, never cached.

use serde::{Deserialize, Serialize};

use crate::store::{StoreError, StoreResult};
use crate::types::{ConnHandle, PeerId};

/// The three procedures the cache manager drives per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Procedure {
    /// Persist the connection's system attributes.
    Update,
    /// Push stored system attributes onto the connection.
    Apply,
    /// Send a service changed indication.
    ServiceChanged,
}

/// Events delivered to the registered handler.
///
/// `peer` is `None` when the connection could not be resolved to a bonded
/// peer at the time the event was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// A local database record was stored for a peer for the first time.
    LocalDbCacheStored { peer: PeerId },
    /// A peer's local database record was refreshed from the connection.
    LocalDbCacheUpdated { peer: Option<PeerId>, conn: ConnHandle },
    /// The peer's stored system attributes are now active on the connection.
    LocalDbCacheApplied { peer: Option<PeerId>, conn: ConnHandle },
    /// The stored record could not be applied because it is malformed.
    ErrorLocalDbCacheApply { peer: Option<PeerId>, conn: ConnHandle },
    /// The record is too large for the store.
    ErrorDataSize { peer: Option<PeerId>, conn: ConnHandle },
    /// The store has no room left; the application should free some.
    ErrorStorageFull { peer: Option<PeerId>, conn: ConnHandle },
    /// Any other store failure, with its raw code.
    ErrorUnexpected {
        peer: Option<PeerId>,
        conn: ConnHandle,
        code: u32,
    },
}

impl CacheEvent {
    /// Success event of a procedure. Service changed has none.
    pub fn success(procedure: Procedure, peer: Option<PeerId>, conn: ConnHandle) -> Option<Self> {
        match procedure {
            Procedure::Update => Some(CacheEvent::LocalDbCacheUpdated { peer, conn }),
            Procedure::Apply => Some(CacheEvent::LocalDbCacheApplied { peer, conn }),
            Procedure::ServiceChanged => None,
        }
    }

    /// Error event for a failed procedure attempt.
    pub fn failure(peer: Option<PeerId>, conn: ConnHandle, err: StoreError) -> Self {
        match err {
            StoreError::DataTooLarge => CacheEvent::ErrorDataSize { peer, conn },
            StoreError::StorageFull => CacheEvent::ErrorStorageFull { peer, conn },
            StoreError::MalformedData => CacheEvent::ErrorLocalDbCacheApply { peer, conn },
            other => CacheEvent::ErrorUnexpected {
                peer,
                conn,
                code: other.code(),
            },
        }
    }

    pub fn peer(&self) -> Option<PeerId> {
        match self {
            CacheEvent::LocalDbCacheStored { peer } => Some(*peer),
            CacheEvent::LocalDbCacheUpdated { peer, .. }
            | CacheEvent::LocalDbCacheApplied { peer, .. }
            | CacheEvent::ErrorLocalDbCacheApply { peer, .. }
            | CacheEvent::ErrorDataSize { peer, .. }
            | CacheEvent::ErrorStorageFull { peer, .. }
            | CacheEvent::ErrorUnexpected { peer, .. } => *peer,
        }
    }

    pub fn conn(&self) -> Option<ConnHandle> {
        match self {
            CacheEvent::LocalDbCacheStored { .. } => None,
            CacheEvent::LocalDbCacheUpdated { conn, .. }
            | CacheEvent::LocalDbCacheApplied { conn, .. }
            | CacheEvent::ErrorLocalDbCacheApply { conn, .. }
            | CacheEvent::ErrorDataSize { conn, .. }
            | CacheEvent::ErrorStorageFull { conn, .. }
            | CacheEvent::ErrorUnexpected { conn, .. } => Some(*conn),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CacheEvent::ErrorLocalDbCacheApply { .. }
                | CacheEvent::ErrorDataSize { .. }
                | CacheEvent::ErrorStorageFull { .. }
                | CacheEvent::ErrorUnexpected { .. }
        )
    }
}

/// What to do after one procedure attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Emit the success event (if any) and clear the pending flag.
    Succeeded,
    /// Store was busy: set the pending flag, stay quiet.
    Deferred,
    /// The link went away under us: clear the flag, stay quiet.
    Dropped,
    /// Service changed needs the system attributes applied first.
    NeedsApply,
    /// Emit an error event and clear the flag; not retried.
    Failed(StoreError),
}

impl Disposition {
    pub fn of(procedure: Procedure, result: StoreResult) -> Self {
        match result {
            Ok(()) => Disposition::Succeeded,
            Err(StoreError::Busy) => Disposition::Deferred,
            Err(StoreError::InvalidConnection) => Disposition::Dropped,
            Err(StoreError::MissingSystemAttributes) if procedure == Procedure::ServiceChanged => {
                Disposition::NeedsApply
            }
            Err(err) => Disposition::Failed(err),
        }
    }

    /// Value the procedure's pending flag takes afterwards.
    pub fn leaves_pending(&self) -> bool {
        matches!(self, Disposition::Deferred | Disposition::NeedsApply)
    }
}
