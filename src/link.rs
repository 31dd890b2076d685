//! Link-layer events the cache manager reacts to, and the combined
//! inbound trigger type.

use crate::peers::{IdentityEvent, SecurityEvent};
use crate::store::StoreNotice;
use crate::types::ConnHandle;

/// 16-bit UUID of the client characteristic configuration descriptor.
pub const CCCD_UUID: u16 = 0x2902;

/// Kind of attribute write the peer performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Request,
    Command,
    SignedCommand,
    PrepareRequest,
    ExecuteRequest,
}

/// What kind of attribute a write landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Characteristic,
    /// A descriptor; `uuid` is its 16-bit Bluetooth SIG UUID, `None` for
    /// vendor-specific (128-bit) descriptors.
    Descriptor { uuid: Option<u16> },
}

/// A write performed by the peer on our attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattsWrite {
    pub handle: u16,
    pub op: WriteOp,
    pub target: WriteTarget,
    pub data: Vec<u8>,
}

impl GattsWrite {
    /// Whether this write changed a CCCD, and thereby the system attributes.
    pub fn is_cccd_write(&self) -> bool {
        self.op == WriteOp::Request
            && self.target
                == WriteTarget::Descriptor {
                    uuid: Some(CCCD_UUID),
                }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected { conn: ConnHandle },
    Disconnected { conn: ConnHandle, reason: u8 },
    /// The peer accessed a CCCD before system attributes were set.
    SystemAttributesMissing { conn: ConnHandle },
    /// The peer confirmed a service changed indication.
    ServiceChangedConfirmed { conn: ConnHandle },
    Write { conn: ConnHandle, write: GattsWrite },
}

impl LinkEvent {
    pub fn conn(&self) -> ConnHandle {
        match self {
            LinkEvent::Connected { conn }
            | LinkEvent::Disconnected { conn, .. }
            | LinkEvent::SystemAttributesMissing { conn }
            | LinkEvent::ServiceChangedConfirmed { conn }
            | LinkEvent::Write { conn, .. } => *conn,
        }
    }
}

/// Everything that can drive the cache manager from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Link(LinkEvent),
    Identity(IdentityEvent),
    Security(SecurityEvent),
    Store(StoreNotice),
}

impl From<LinkEvent> for Trigger {
    fn from(ev: LinkEvent) -> Self {
        Trigger::Link(ev)
    }
}

impl From<IdentityEvent> for Trigger {
    fn from(ev: IdentityEvent) -> Self {
        Trigger::Identity(ev)
    }
}

impl From<SecurityEvent> for Trigger {
    fn from(ev: SecurityEvent) -> Self {
        Trigger::Security(ev)
    }
}

impl From<StoreNotice> for Trigger {
    fn from(notice: StoreNotice) -> Self {
        Trigger::Store(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(op: WriteOp, target: WriteTarget) -> GattsWrite {
        GattsWrite {
            handle: 0x000D,
            op,
            target,
            data: vec![0x02, 0x00],
        }
    }

    #[test]
    fn test_cccd_write_request_detected() {
        let w = write(WriteOp::Request, WriteTarget::Descriptor { uuid: Some(CCCD_UUID) });
        assert!(w.is_cccd_write());
    }

    #[test]
    fn test_non_cccd_writes_ignored() {
        assert!(!write(WriteOp::Command, WriteTarget::Descriptor { uuid: Some(CCCD_UUID) })
            .is_cccd_write());
        assert!(!write(WriteOp::Request, WriteTarget::Characteristic).is_cccd_write());
        assert!(!write(WriteOp::Request, WriteTarget::Descriptor { uuid: Some(0x2901) })
            .is_cccd_write());
        assert!(!write(WriteOp::Request, WriteTarget::Descriptor { uuid: None }).is_cccd_write());
    }

    #[test]
    fn test_link_event_conn() {
        let ev = LinkEvent::Disconnected {
            conn: ConnHandle(5),
            reason: 0x13,
        };
        assert_eq!(ev.conn(), ConnHandle(5));
        assert_eq!(Trigger::from(ev.clone()), Trigger::Link(ev));
    }
}
