//! Identity, security, and connection-set collaborators
//!
//! The cache manager never tracks who is connected or who is bonded. It asks
//! these collaborators at the moment it needs to know.

use crate::types::{ConnHandle, PeerId};

/// Maps live connections to bonded peers.
pub trait IdentityResolver: Send {
    /// Peer bonded on this connection, `None` if not (yet) known.
    fn peer_id_for(&self, conn: ConnHandle) -> Option<PeerId>;

    /// Connection the peer is currently on, if any.
    fn conn_for(&self, peer: PeerId) -> Option<ConnHandle>;
}

/// Enumerates the links that are currently up.
pub trait ConnectionSet: Send {
    fn active_connections(&self) -> Vec<ConnHandle>;
}

/// Events raised by the identity manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityEvent {
    /// A previously bonded peer was recognised on a new connection.
    BondedPeerConnected { conn: ConnHandle },
}

/// Events raised by the security dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    /// Bonding finished and the keys were persisted.
    BondingInfoStored { conn: ConnHandle, peer: PeerId },
}
