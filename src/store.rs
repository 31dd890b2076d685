//! Store adapter interfaces
//!
//! The local store owns persistence of our attribute table's system
//! attributes per bonded peer and talks to the stack to push them onto a
//! live connection. The remote store keeps discovered peer databases.
//! Neither retries anything; that is the cache manager's job.

use thiserror::Error;

use crate::types::{ConnHandle, LocalGattDb, PeerId, RemoteGattDb};

/// Raw result codes, matching the values the underlying stack reports.
pub mod codes {
    pub const NO_MEM: u32 = 0x04;
    pub const NOT_FOUND: u32 = 0x05;
    pub const INVALID_DATA: u32 = 0x0B;
    pub const DATA_SIZE: u32 = 0x0C;
    pub const BUSY: u32 = 0x11;
    pub const INVALID_CONN_HANDLE: u32 = 0x3002;
    pub const SYS_ATTR_MISSING: u32 = 0x3401;
}

/// Non-success outcomes of a store operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store busy, try again later")]
    Busy,

    #[error("Connection handle is not valid")]
    InvalidConnection,

    #[error("Record does not fit")]
    DataTooLarge,

    #[error("Storage full")]
    StorageFull,

    #[error("Stored record is malformed")]
    MalformedData,

    #[error("Peer has no system attributes applied")]
    MissingSystemAttributes,

    #[error("Store error {0:#x}")]
    Other(u32),
}

impl StoreError {
    /// Numeric code of this outcome, as carried by unexpected-error events.
    pub fn code(&self) -> u32 {
        match self {
            StoreError::Busy => codes::BUSY,
            StoreError::InvalidConnection => codes::INVALID_CONN_HANDLE,
            StoreError::DataTooLarge => codes::DATA_SIZE,
            StoreError::StorageFull => codes::NO_MEM,
            StoreError::MalformedData => codes::INVALID_DATA,
            StoreError::MissingSystemAttributes => codes::SYS_ATTR_MISSING,
            StoreError::Other(code) => *code,
        }
    }
}

pub type StoreResult<T = ()> = Result<T, StoreError>;

/// Local attribute database persistence (server side of the cache).
pub trait LocalDbStore: Send {
    /// Read the connection's current system attributes from the stack and
    /// persist them for its peer.
    fn update(&mut self, conn: ConnHandle) -> StoreResult;

    /// Push the peer's stored system attributes onto the connection.
    fn apply(&mut self, conn: ConnHandle) -> StoreResult;

    /// Send a service changed indication on the connection.
    fn send_service_changed(&mut self, conn: ConnHandle) -> StoreResult;

    /// Record that the peer has confirmed the last service changed indication.
    fn peer_notified(&mut self, peer: PeerId);

    /// Record that our attribute table changed; every bonded peer now needs
    /// a service changed indication.
    fn database_changed(&mut self);

    /// Whether the peer on this connection missed a service changed
    /// indication.
    fn service_changed_needed(&self, conn: ConnHandle) -> bool;

    fn get(&self, peer: PeerId) -> StoreResult<LocalGattDb>;

    fn set(&mut self, peer: PeerId, db: LocalGattDb) -> StoreResult;
}

/// Remote attribute database persistence (client side of the cache).
pub trait RemoteDbStore: Send {
    fn store(&mut self, peer: PeerId, db: &RemoteGattDb) -> StoreResult;

    fn retrieve(&self, peer: PeerId) -> StoreResult<RemoteGattDb>;
}

/// Notices raised by the local store when persistence work completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreNotice {
    /// A peer's local database record was written for the first time.
    LocalDbCacheStored { peer: PeerId },
    /// A peer's local database record was refreshed from a live connection.
    LocalDbCacheUpdated { peer: PeerId, conn: ConnHandle },
    /// A peer's "needs service changed" state was persisted; `pending`
    /// means the peer's cached view is now invalid.
    ServiceChangedStateStored { peer: PeerId, pending: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping_is_stable() {
        assert_eq!(StoreError::Busy.code(), 0x11);
        assert_eq!(StoreError::InvalidConnection.code(), 0x3002);
        assert_eq!(StoreError::DataTooLarge.code(), 0x0C);
        assert_eq!(StoreError::StorageFull.code(), 0x04);
        assert_eq!(StoreError::MalformedData.code(), 0x0B);
        assert_eq!(StoreError::MissingSystemAttributes.code(), 0x3401);
        assert_eq!(StoreError::Other(0x1234).code(), 0x1234);
    }

    #[test]
    fn test_other_display_is_hex() {
        assert_eq!(StoreError::Other(0x3401 + 1).to_string(), "Store error 0x3402");
    }
}
