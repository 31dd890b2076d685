//! Identifiers and cached database records
//!
//! Connection handles and peer ids are plain newtypes; the records are the
//! payloads the local and remote store adapters persist on our behalf.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle of an active link, assigned by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnHandle(pub u16);

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Stable identifier of a bonded peer, survives reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u16);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// The system attributes (CCCD values and friends) of our own attribute
/// table, as last acknowledged by one bonded peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalGattDb {
    /// Which attribute groups the blob covers (stack specific).
    pub flags: u32,
    /// Opaque system-attribute blob.
    pub data: Vec<u8>,
}

impl LocalGattDb {
    pub fn new(flags: u32, data: Vec<u8>) -> Self {
        Self { flags, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A characteristic discovered on a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCharacteristic {
    pub uuid: Uuid,
    pub decl_handle: u16,
    pub value_handle: u16,
    /// Handle of the client characteristic configuration descriptor, if any.
    pub cccd_handle: Option<u16>,
}

/// A primary service discovered on a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteService {
    pub uuid: Uuid,
    pub start_handle: u16,
    pub end_handle: u16,
    pub characteristics: Vec<RemoteCharacteristic>,
}

/// Cached layout of a peer's attribute table, so reconnects can skip
/// service discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteGattDb {
    pub services: Vec<RemoteService>,
}

impl RemoteGattDb {
    pub fn new(services: Vec<RemoteService>) -> Self {
        Self { services }
    }
}
