//! GATT cache manager
//!
//! Keeps a peripheral's attribute-table cache and its bonded peers' view of
//! it in step across reconnects. Store outcomes become pending flags or
//! events, and deferred work is retried whenever the next event arrives.

pub mod config;
pub mod error;
pub mod event;
pub mod flags;
pub mod link;
pub mod manager;
pub mod peers;
pub mod service;
pub mod simulated;
pub mod store;
pub mod types;

pub use config::CacheConfig;
pub use error::CacheError;
pub use event::{CacheEvent, Procedure};
pub use link::{GattsWrite, LinkEvent, Trigger, WriteOp, WriteTarget};
pub use manager::{handler_fn, CacheEventHandler, Collaborators, GattCacheManager};
pub use peers::{ConnectionSet, IdentityEvent, IdentityResolver, SecurityEvent};
pub use store::{LocalDbStore, RemoteDbStore, StoreError, StoreNotice, StoreResult};
pub use types::{ConnHandle, LocalGattDb, PeerId, RemoteGattDb};
