//! In-process peer stack simulator
//!
//! One shared state stands in for the link layer, the identity manager and
//! both database stores, so the cache manager can be driven without real
//! BLE hardware. Store outcomes can be scripted per procedure and
//! connection; unscripted calls on a live connection succeed, calls on a
//! connection that is not up fail with `InvalidConnection`.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::event::{CacheEvent, Procedure};
use crate::manager::{CacheEventHandler, Collaborators, GattCacheManager};
use crate::peers::{ConnectionSet, IdentityResolver};
use crate::store::{codes, LocalDbStore, RemoteDbStore, StoreError, StoreResult};
use crate::types::{ConnHandle, LocalGattDb, PeerId, RemoteGattDb};

/// Default upper bound on a stored local database record.
pub const DEFAULT_MAX_RECORD_LEN: usize = 512;

/// A store operation observed by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    Update(ConnHandle),
    Apply(ConnHandle),
    ServiceChanged(ConnHandle),
    PeerNotified(PeerId),
    DatabaseChanged,
}

struct SimState {
    /// Live links and the bonded peer on each, if resolved. Ordered so
    /// enumeration is deterministic.
    links: BTreeMap<ConnHandle, Option<PeerId>>,
    scripted: HashMap<(Procedure, ConnHandle), VecDeque<StoreResult>>,
    calls: Vec<StoreCall>,
    local: HashMap<PeerId, LocalGattDb>,
    remote: HashMap<PeerId, RemoteGattDb>,
    service_changed_needed: HashSet<PeerId>,
    max_record_len: usize,
}

impl SimState {
    fn run(&mut self, procedure: Procedure, conn: ConnHandle) -> StoreResult {
        self.calls.push(match procedure {
            Procedure::Update => StoreCall::Update(conn),
            Procedure::Apply => StoreCall::Apply(conn),
            Procedure::ServiceChanged => StoreCall::ServiceChanged(conn),
        });
        if !self.links.contains_key(&conn) {
            return Err(StoreError::InvalidConnection);
        }
        let result = self
            .scripted
            .get_mut(&(procedure, conn))
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(()));
        // A successful update leaves a record behind for a bonded peer.
        if procedure == Procedure::Update && result.is_ok() {
            if let Some(Some(peer)) = self.links.get(&conn).copied() {
                self.local.entry(peer).or_default();
            }
        }
        result
    }
}

/// Shared handle to one simulated peer stack. Clones see the same state.
#[derive(Clone)]
pub struct SimPeerStack {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimPeerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPeerStack {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                links: BTreeMap::new(),
                scripted: HashMap::new(),
                calls: Vec::new(),
                local: HashMap::new(),
                remote: HashMap::new(),
                service_changed_needed: HashSet::new(),
                max_record_len: DEFAULT_MAX_RECORD_LEN,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not take the simulator down with it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Boxed collaborators backed by this simulator.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            local: Box::new(self.clone()),
            remote: Box::new(self.clone()),
            identity: Box::new(self.clone()),
            connections: Box::new(self.clone()),
        }
    }

    /// Bring a link up, optionally already resolved to a bonded peer.
    pub fn connect(&self, conn: ConnHandle, peer: Option<PeerId>) {
        self.state().links.insert(conn, peer);
    }

    /// Resolve an existing link to a peer, as bonding or identity
    /// resolution would.
    pub fn bond(&self, conn: ConnHandle, peer: PeerId) {
        if let Some(slot) = self.state().links.get_mut(&conn) {
            *slot = Some(peer);
        }
    }

    /// Drop a link. Scripted outcomes for it are discarded.
    pub fn disconnect(&self, conn: ConnHandle) {
        let mut state = self.state();
        state.links.remove(&conn);
        state.scripted.retain(|(_, c), _| *c != conn);
    }

    /// Queue outcomes for the next calls of `procedure` on `conn`.
    pub fn script<I>(&self, procedure: Procedure, conn: ConnHandle, outcomes: I)
    where
        I: IntoIterator<Item = StoreResult>,
    {
        self.state()
            .scripted
            .entry((procedure, conn))
            .or_default()
            .extend(outcomes);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<StoreCall> {
        std::mem::take(&mut self.state().calls)
    }

    pub fn count(&self, call: StoreCall) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub fn mark_service_changed_needed(&self, peer: PeerId) {
        self.state().service_changed_needed.insert(peer);
    }

    pub fn service_changed_needed_for(&self, peer: PeerId) -> bool {
        self.state().service_changed_needed.contains(&peer)
    }

    pub fn local_record(&self, peer: PeerId) -> Option<LocalGattDb> {
        self.state().local.get(&peer).cloned()
    }

    pub fn remote_record(&self, peer: PeerId) -> Option<RemoteGattDb> {
        self.state().remote.get(&peer).cloned()
    }

    pub fn set_max_record_len(&self, len: usize) {
        self.state().max_record_len = len;
    }
}

impl LocalDbStore for SimPeerStack {
    fn update(&mut self, conn: ConnHandle) -> StoreResult {
        self.state().run(Procedure::Update, conn)
    }

    fn apply(&mut self, conn: ConnHandle) -> StoreResult {
        self.state().run(Procedure::Apply, conn)
    }

    fn send_service_changed(&mut self, conn: ConnHandle) -> StoreResult {
        self.state().run(Procedure::ServiceChanged, conn)
    }

    fn peer_notified(&mut self, peer: PeerId) {
        let mut state = self.state();
        state.calls.push(StoreCall::PeerNotified(peer));
        state.service_changed_needed.remove(&peer);
    }

    fn database_changed(&mut self) {
        let mut state = self.state();
        state.calls.push(StoreCall::DatabaseChanged);
        let bonded: Vec<PeerId> = state
            .links
            .values()
            .flatten()
            .copied()
            .chain(state.local.keys().copied())
            .collect();
        state.service_changed_needed.extend(bonded);
    }

    fn service_changed_needed(&self, conn: ConnHandle) -> bool {
        let state = self.state();
        match state.links.get(&conn) {
            Some(Some(peer)) => state.service_changed_needed.contains(peer),
            _ => false,
        }
    }

    fn get(&self, peer: PeerId) -> StoreResult<LocalGattDb> {
        self.state()
            .local
            .get(&peer)
            .cloned()
            .ok_or(StoreError::Other(codes::NOT_FOUND))
    }

    fn set(&mut self, peer: PeerId, db: LocalGattDb) -> StoreResult {
        let mut state = self.state();
        if db.len() > state.max_record_len {
            return Err(StoreError::DataTooLarge);
        }
        state.local.insert(peer, db);
        Ok(())
    }
}

impl RemoteDbStore for SimPeerStack {
    fn store(&mut self, peer: PeerId, db: &RemoteGattDb) -> StoreResult {
        self.state().remote.insert(peer, db.clone());
        Ok(())
    }

    fn retrieve(&self, peer: PeerId) -> StoreResult<RemoteGattDb> {
        self.state()
            .remote
            .get(&peer)
            .cloned()
            .ok_or(StoreError::Other(codes::NOT_FOUND))
    }
}

impl IdentityResolver for SimPeerStack {
    fn peer_id_for(&self, conn: ConnHandle) -> Option<PeerId> {
        self.state().links.get(&conn).copied().flatten()
    }

    fn conn_for(&self, peer: PeerId) -> Option<ConnHandle> {
        self.state()
            .links
            .iter()
            .find(|(_, p)| **p == Some(peer))
            .map(|(conn, _)| *conn)
    }
}

impl ConnectionSet for SimPeerStack {
    fn active_connections(&self) -> Vec<ConnHandle> {
        self.state().links.keys().copied().collect()
    }
}

/// Event handler that records everything it is given.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<CacheEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, Vec<CacheEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return and forget everything recorded so far.
    pub fn take(&self) -> Vec<CacheEvent> {
        std::mem::take(&mut *self.events())
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }
}

impl CacheEventHandler for EventLog {
    fn on_event(&mut self, _manager: &mut GattCacheManager, event: &CacheEvent) {
        self.events().push(event.clone());
    }
}
