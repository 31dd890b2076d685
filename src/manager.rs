//! GattCacheManager: dispatch and retry core
//!
//! Receives link, identity, security and store triggers, runs the matching
//! local-database procedure, turns the outcome into an event or a pending
//! flag, and after every trigger sweeps all live connections to retry
//! deferred work. There are no timers: a deferred procedure only runs again
//! when something else happens.
//!
//! The registered handler gets `&mut GattCacheManager` and may call back
//! into any public method. Events raised during such a call are queued and
//! delivered in order as soon as the handler returns.

use std::collections::VecDeque;
use std::mem;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::event::{CacheEvent, Disposition, Procedure};
use crate::flags::{ConnFlagRegistry, FlagSlot};
use crate::link::{LinkEvent, Trigger};
use crate::peers::{ConnectionSet, IdentityEvent, IdentityResolver, SecurityEvent};
use crate::store::{LocalDbStore, RemoteDbStore, StoreError, StoreNotice};
use crate::types::{ConnHandle, LocalGattDb, PeerId, RemoteGattDb};

/// Sweep order: applying first lets a service changed retry in the same
/// pass find its system attributes in place.
const SWEEP_ORDER: [Procedure; 3] = [Procedure::Apply, Procedure::Update, Procedure::ServiceChanged];

/// Receives every [`CacheEvent`] exactly once.
pub trait CacheEventHandler: Send {
    fn on_event(&mut self, manager: &mut GattCacheManager, event: &CacheEvent);
}

/// Adapter turning a closure into a [`CacheEventHandler`].
pub struct FnHandler<F>(F);

/// Wrap a closure as an event handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(&mut GattCacheManager, &CacheEvent) + Send,
{
    FnHandler(f)
}

impl<F> CacheEventHandler for FnHandler<F>
where
    F: FnMut(&mut GattCacheManager, &CacheEvent) + Send,
{
    fn on_event(&mut self, manager: &mut GattCacheManager, event: &CacheEvent) {
        (self.0)(manager, event)
    }
}

/// The injected collaborators of one manager instance.
pub struct Collaborators {
    pub local: Box<dyn LocalDbStore>,
    pub remote: Box<dyn RemoteDbStore>,
    pub identity: Box<dyn IdentityResolver>,
    pub connections: Box<dyn ConnectionSet>,
}

enum HandlerSlot {
    Unregistered,
    Ready(Box<dyn CacheEventHandler>),
    /// Handler is on the stack; events queue up until it returns.
    Dispatching,
}

#[derive(Debug, Clone, Copy)]
struct PendingSlots {
    update: FlagSlot,
    apply: FlagSlot,
    service_changed: FlagSlot,
}

impl PendingSlots {
    fn slot(&self, procedure: Procedure) -> FlagSlot {
        match procedure {
            Procedure::Update => self.update,
            Procedure::Apply => self.apply,
            Procedure::ServiceChanged => self.service_changed,
        }
    }
}

pub struct GattCacheManager {
    config: CacheConfig,
    local: Box<dyn LocalDbStore>,
    remote: Box<dyn RemoteDbStore>,
    identity: Box<dyn IdentityResolver>,
    connections: Box<dyn ConnectionSet>,
    flags: ConnFlagRegistry,
    slots: Option<PendingSlots>,
    handler: HandlerSlot,
    queued: VecDeque<CacheEvent>,
}

impl GattCacheManager {
    /// Create an uninitialized manager. Nothing works until [`init`](Self::init).
    pub fn new(config: CacheConfig, collaborators: Collaborators) -> Self {
        let mut flags = ConnFlagRegistry::new(config.flag_slots);
        for _ in 0..config.reserved_flag_slots {
            let _ = flags.acquire();
        }
        Self {
            config,
            local: collaborators.local,
            remote: collaborators.remote,
            identity: collaborators.identity,
            connections: collaborators.connections,
            flags,
            slots: None,
            handler: HandlerSlot::Unregistered,
            queued: VecDeque::new(),
        }
    }

    /// Register the event handler and reserve the pending-flag slots.
    ///
    /// On error the manager stays uninitialized.
    pub fn init<H>(&mut self, handler: H) -> Result<(), CacheError>
    where
        H: CacheEventHandler + 'static,
    {
        if !matches!(self.handler, HandlerSlot::Unregistered) {
            return Err(CacheError::AlreadyInitialized);
        }
        self.config.validate()?;

        let available = self.flags.remaining();
        if available < 3 {
            return Err(CacheError::FlagSlotsExhausted { needed: 3, available });
        }
        let (Some(update), Some(apply), Some(service_changed)) =
            (self.flags.acquire(), self.flags.acquire(), self.flags.acquire())
        else {
            return Err(CacheError::FlagSlotsExhausted { needed: 3, available });
        };

        self.slots = Some(PendingSlots {
            update,
            apply,
            service_changed,
        });
        self.handler = HandlerSlot::Ready(Box::new(handler));
        log::info!(
            "GATT cache manager ready (flag slots {}/{}/{})",
            update.index(),
            apply.index(),
            service_changed.index()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.slots.is_some()
    }

    /// Whether a procedure is waiting for a retry on this connection.
    pub fn is_pending(&self, conn: ConnHandle, procedure: Procedure) -> Result<bool, CacheError> {
        let slots = self.slots()?;
        Ok(self.flags.get(conn, slots.slot(procedure)))
    }

    fn slots(&self) -> Result<PendingSlots, CacheError> {
        self.slots.ok_or(CacheError::NotInitialized)
    }

    // ---------------------------------------------------------------------
    // Inbound triggers
    // ---------------------------------------------------------------------

    /// Process one trigger to completion, then retry pending work.
    pub fn dispatch(&mut self, trigger: impl Into<Trigger>) -> Result<(), CacheError> {
        let slots = self.slots()?;
        match trigger.into() {
            Trigger::Link(ev) => self.on_link_event(slots, ev),
            Trigger::Identity(ev) => self.on_identity_event(slots, ev),
            Trigger::Security(ev) => self.on_security_event(slots, ev),
            Trigger::Store(notice) => self.on_store_notice(slots, notice),
        }
        self.sweep(slots);
        Ok(())
    }

    pub fn handle_link_event(&mut self, ev: LinkEvent) -> Result<(), CacheError> {
        self.dispatch(ev)
    }

    pub fn handle_identity_event(&mut self, ev: IdentityEvent) -> Result<(), CacheError> {
        self.dispatch(ev)
    }

    pub fn handle_security_event(&mut self, ev: SecurityEvent) -> Result<(), CacheError> {
        self.dispatch(ev)
    }

    pub fn handle_store_notice(&mut self, notice: StoreNotice) -> Result<(), CacheError> {
        self.dispatch(notice)
    }

    fn on_link_event(&mut self, slots: PendingSlots, ev: LinkEvent) {
        match ev {
            LinkEvent::Connected { conn } => {
                // The identity manager may already have flagged this link.
                log::debug!("{} connected", conn);
            }
            LinkEvent::Disconnected { conn, reason } => {
                log::debug!("{} disconnected (reason {:#04x})", conn, reason);
            }
            LinkEvent::SystemAttributesMissing { conn } => {
                self.attempt(slots, Procedure::Apply, conn);
            }
            LinkEvent::ServiceChangedConfirmed { conn } => {
                if let Some(peer) = self.identity.peer_id_for(conn) {
                    self.local.peer_notified(peer);
                }
                self.flags.set(conn, slots.service_changed, false);
            }
            LinkEvent::Write { conn, write } => {
                if write.is_cccd_write() {
                    self.attempt(slots, Procedure::Update, conn);
                }
            }
        }
    }

    fn on_identity_event(&mut self, slots: PendingSlots, ev: IdentityEvent) {
        match ev {
            IdentityEvent::BondedPeerConnected { conn } => {
                self.attempt(slots, Procedure::Apply, conn);
                if self.local.service_changed_needed(conn) {
                    self.flags.set(conn, slots.service_changed, true);
                }
            }
        }
    }

    fn on_security_event(&mut self, slots: PendingSlots, ev: SecurityEvent) {
        match ev {
            SecurityEvent::BondingInfoStored { conn, .. } => {
                self.attempt(slots, Procedure::Update, conn);
            }
        }
    }

    fn on_store_notice(&mut self, slots: PendingSlots, notice: StoreNotice) {
        match notice {
            StoreNotice::LocalDbCacheStored { peer } => {
                self.emit(CacheEvent::LocalDbCacheStored { peer });
                if let Some(conn) = self.identity.conn_for(peer) {
                    self.attempt(slots, Procedure::Apply, conn);
                }
            }
            StoreNotice::LocalDbCacheUpdated { peer, conn } => {
                self.emit(CacheEvent::LocalDbCacheUpdated {
                    peer: Some(peer),
                    conn,
                });
            }
            StoreNotice::ServiceChangedStateStored { peer, pending } => {
                if pending {
                    if let Some(conn) = self.identity.conn_for(peer) {
                        self.flags.set(conn, slots.service_changed, true);
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Procedures and retry
    // ---------------------------------------------------------------------

    /// Run one procedure from an event context, where nobody can be handed
    /// an error: outcomes become flags and events.
    fn attempt(&mut self, slots: PendingSlots, procedure: Procedure, conn: ConnHandle) {
        let result = match procedure {
            Procedure::Update => self.local.update(conn),
            Procedure::Apply => self.local.apply(conn),
            Procedure::ServiceChanged => self.local.send_service_changed(conn),
        };
        let disposition = Disposition::of(procedure, result);
        log::debug!("{:?} on {}: {:?}", procedure, conn, disposition);

        self.flags
            .set(conn, slots.slot(procedure), disposition.leaves_pending());

        match disposition {
            Disposition::Succeeded => {
                let peer = self.identity.peer_id_for(conn);
                if let Some(event) = CacheEvent::success(procedure, peer, conn) {
                    self.emit(event);
                }
            }
            Disposition::Deferred | Disposition::Dropped => {}
            // Service changed stays pending; a failing apply reports on each pass.
            Disposition::NeedsApply => self.attempt(slots, Procedure::Apply, conn),
            Disposition::Failed(err) => {
                if matches!(err, StoreError::Other(_) | StoreError::MissingSystemAttributes) {
                    log::warn!("{:?} on {} failed unexpectedly: {}", procedure, conn, err);
                }
                let peer = self.identity.peer_id_for(conn);
                self.emit(CacheEvent::failure(peer, conn, err));
            }
        }
    }

    /// Retry every pending procedure on every live connection, once.
    ///
    /// Flags of handles that are no longer live are dropped first, so a
    /// handle reused for a new link starts clean.
    fn sweep(&mut self, slots: PendingSlots) {
        let active = self.connections.active_connections();
        self.flags.retain_active(&active);
        for procedure in SWEEP_ORDER {
            let slot = slots.slot(procedure);
            if !self.flags.any_set(slot, &active) {
                continue;
            }
            for conn in self.flags.flagged(slot, &active) {
                // Re-read: an earlier attempt in this pass may have changed it.
                if self.flags.get(conn, slot) {
                    self.attempt(slots, procedure, conn);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Event delivery
    // ---------------------------------------------------------------------

    fn emit(&mut self, event: CacheEvent) {
        self.queued.push_back(event);
        self.drain();
    }

    fn drain(&mut self) {
        let mut handler = match mem::replace(&mut self.handler, HandlerSlot::Dispatching) {
            HandlerSlot::Ready(handler) => handler,
            other => {
                // Already dispatching: the outer drain delivers what we queued.
                self.handler = other;
                return;
            }
        };
        while let Some(event) = self.queued.pop_front() {
            handler.on_event(self, &event);
        }
        self.handler = HandlerSlot::Ready(handler);
    }

    // ---------------------------------------------------------------------
    // Application API
    // ---------------------------------------------------------------------

    pub fn remote_db_store(&mut self, peer: PeerId, db: &RemoteGattDb) -> Result<(), CacheError> {
        self.slots()?;
        Ok(self.remote.store(peer, db)?)
    }

    pub fn remote_db_retrieve(&self, peer: PeerId) -> Result<RemoteGattDb, CacheError> {
        self.slots()?;
        Ok(self.remote.retrieve(peer)?)
    }

    /// Persist the connection's current system attributes.
    ///
    /// A busy store is not an error here: the update is marked pending and
    /// retried on a later sweep. No events are emitted and no sweep runs.
    pub fn local_db_update(&mut self, conn: ConnHandle) -> Result<(), CacheError> {
        let slots = self.slots()?;
        let result = self.local.update(conn);
        self.flags
            .set(conn, slots.update, result == Err(StoreError::Busy));
        match result {
            Ok(()) | Err(StoreError::Busy) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn local_db_get(&self, peer: PeerId) -> Result<LocalGattDb, CacheError> {
        self.slots()?;
        Ok(self.local.get(peer)?)
    }

    pub fn local_db_set(&mut self, peer: PeerId, db: LocalGattDb) -> Result<(), CacheError> {
        self.slots()?;
        Ok(self.local.set(peer, db)?)
    }

    /// Our attribute table changed. Every live connection with a resolvable
    /// peer is marked for a service changed indication, then pending work
    /// is swept.
    ///
    /// Connections whose peer cannot be resolved yet are skipped and are not
    /// revisited later.
    ///
    /// A service changed attempt that finds no system attributes applies the
    /// stored record first. If that record keeps failing to apply, every
    /// sweep raises `ErrorLocalDbCacheApply` again for as long as the
    /// indication stays pending.
    pub fn local_database_has_changed(&mut self) -> Result<(), CacheError> {
        let slots = self.slots()?;
        self.local.database_changed();
        for conn in self.connections.active_connections() {
            if self.identity.peer_id_for(conn).is_some() {
                self.flags.set(conn, slots.service_changed, true);
            }
        }
        self.sweep(slots);
        Ok(())
    }
}
