//! Per-connection user flags
//!
//! A small fixed number of boolean slots per connection handle. Slots are
//! handed out once at start-up; each connection's flags live in one bitmask
//! that is created on first write and defaults to all-false.

use std::collections::HashMap;

use crate::types::ConnHandle;

/// Hard upper bound on slots, one bit each in a `u32`.
pub const MAX_FLAG_SLOTS: u8 = 32;

/// Index of one acquired flag slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagSlot(u8);

impl FlagSlot {
    fn mask(self) -> u32 {
        1 << self.0
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct ConnFlagRegistry {
    capacity: u8,
    next_free: u8,
    flags: HashMap<ConnHandle, u32>,
}

impl ConnFlagRegistry {
    /// Create a registry with `capacity` slots (clamped to [`MAX_FLAG_SLOTS`]).
    pub fn new(capacity: u8) -> Self {
        Self {
            capacity: capacity.min(MAX_FLAG_SLOTS),
            next_free: 0,
            flags: HashMap::new(),
        }
    }

    /// Take the next free slot, `None` when all are in use.
    pub fn acquire(&mut self) -> Option<FlagSlot> {
        if self.next_free >= self.capacity {
            return None;
        }
        let slot = FlagSlot(self.next_free);
        self.next_free += 1;
        Some(slot)
    }

    pub fn remaining(&self) -> u8 {
        self.capacity - self.next_free
    }

    pub fn get(&self, conn: ConnHandle, slot: FlagSlot) -> bool {
        self.flags
            .get(&conn)
            .map_or(false, |bits| bits & slot.mask() != 0)
    }

    pub fn set(&mut self, conn: ConnHandle, slot: FlagSlot, value: bool) {
        if value {
            *self.flags.entry(conn).or_insert(0) |= slot.mask();
        } else if let Some(bits) = self.flags.get_mut(&conn) {
            *bits &= !slot.mask();
        }
    }

    /// Forget every connection not in `active`. A handle the stack later
    /// reuses for a new link then starts with all flags false.
    pub fn retain_active(&mut self, active: &[ConnHandle]) {
        self.flags.retain(|conn, _| active.contains(conn));
    }

    /// OR of one slot across the given connections.
    pub fn any_set(&self, slot: FlagSlot, active: &[ConnHandle]) -> bool {
        active.iter().any(|conn| self.get(*conn, slot))
    }

    /// The given connections that have the slot set, in input order.
    pub fn flagged(&self, slot: FlagSlot, active: &[ConnHandle]) -> Vec<ConnHandle> {
        active
            .iter()
            .copied()
            .filter(|conn| self.get(*conn, slot))
            .collect()
    }
}
