//! CacheService: one cache manager on its own tokio task
//!
//! The manager itself is synchronous and single-threaded. This wrapper gives
//! it a home in async applications: commands are queued on an mpsc channel
//! and run one at a time, replies come back on oneshot channels, and events
//! fan out to any number of subscribers over a broadcast channel.

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::event::{CacheEvent, Procedure};
use crate::link::Trigger;
use crate::manager::{handler_fn, Collaborators, GattCacheManager};
use crate::types::{ConnHandle, LocalGattDb, PeerId, RemoteGattDb};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Cache service has shut down")]
    Closed,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

type Reply<T> = oneshot::Sender<Result<T, CacheError>>;

enum Command {
    Dispatch(Trigger, Reply<()>),
    LocalDbUpdate(ConnHandle, Reply<()>),
    LocalDatabaseChanged(Reply<()>),
    LocalDbGet(PeerId, Reply<LocalGattDb>),
    LocalDbSet(PeerId, LocalGattDb, Reply<()>),
    RemoteDbStore(PeerId, RemoteGattDb, Reply<()>),
    RemoteDbRetrieve(PeerId, Reply<RemoteGattDb>),
    IsPending(ConnHandle, Procedure, Reply<bool>),
}

/// Cloneable handle to a running cache service.
#[derive(Clone)]
pub struct CacheHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<CacheEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Build and initialize a manager, then move it onto a new task.
///
/// Initialization errors surface here, before anything is spawned. Must be
/// called from within a tokio runtime.
pub fn spawn(config: CacheConfig, collaborators: Collaborators) -> Result<CacheHandle, ServiceError> {
    let (events, _) = broadcast::channel(config.event_buffer.max(1));
    let (commands, rx) = mpsc::channel(config.command_queue.max(1));
    let (shutdown_tx, _) = broadcast::channel(1);

    let mut manager = GattCacheManager::new(config, collaborators);
    let event_tx = events.clone();
    manager.init(handler_fn(move |_: &mut GattCacheManager, event: &CacheEvent| {
        // No subscribers is fine; events are fire-and-forget.
        let _ = event_tx.send(event.clone());
    }))?;

    let shutdown = shutdown_tx.subscribe();
    tokio::spawn(run(manager, rx, shutdown));
    log::debug!("cache service started");

    Ok(CacheHandle {
        commands,
        events,
        shutdown_tx,
    })
}

async fn run(
    mut manager: GattCacheManager,
    mut rx: mpsc::Receiver<Command>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(command) => execute(&mut manager, command),
                    None => break,
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    log::debug!("cache service stopped");
}

fn execute(manager: &mut GattCacheManager, command: Command) {
    // A dropped reply receiver just means the caller stopped waiting.
    match command {
        Command::Dispatch(trigger, reply) => {
            let _ = reply.send(manager.dispatch(trigger));
        }
        Command::LocalDbUpdate(conn, reply) => {
            let _ = reply.send(manager.local_db_update(conn));
        }
        Command::LocalDatabaseChanged(reply) => {
            let _ = reply.send(manager.local_database_has_changed());
        }
        Command::LocalDbGet(peer, reply) => {
            let _ = reply.send(manager.local_db_get(peer));
        }
        Command::LocalDbSet(peer, db, reply) => {
            let _ = reply.send(manager.local_db_set(peer, db));
        }
        Command::RemoteDbStore(peer, db, reply) => {
            let _ = reply.send(manager.remote_db_store(peer, &db));
        }
        Command::RemoteDbRetrieve(peer, reply) => {
            let _ = reply.send(manager.remote_db_retrieve(peer));
        }
        Command::IsPending(conn, procedure, reply) => {
            let _ = reply.send(manager.is_pending(conn, procedure));
        }
    }
}

impl CacheHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ServiceError::Closed)?;
        let result = rx.await.map_err(|_| ServiceError::Closed)?;
        Ok(result?)
    }

    /// Subscribe to cache events. Only events raised after subscribing are seen.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub async fn dispatch(&self, trigger: impl Into<Trigger>) -> Result<(), ServiceError> {
        let trigger = trigger.into();
        self.request(|reply| Command::Dispatch(trigger, reply)).await
    }

    pub async fn local_db_update(&self, conn: ConnHandle) -> Result<(), ServiceError> {
        self.request(|reply| Command::LocalDbUpdate(conn, reply)).await
    }

    pub async fn local_database_has_changed(&self) -> Result<(), ServiceError> {
        self.request(Command::LocalDatabaseChanged).await
    }

    pub async fn local_db_get(&self, peer: PeerId) -> Result<LocalGattDb, ServiceError> {
        self.request(|reply| Command::LocalDbGet(peer, reply)).await
    }

    pub async fn local_db_set(&self, peer: PeerId, db: LocalGattDb) -> Result<(), ServiceError> {
        self.request(|reply| Command::LocalDbSet(peer, db, reply)).await
    }

    pub async fn remote_db_store(&self, peer: PeerId, db: RemoteGattDb) -> Result<(), ServiceError> {
        self.request(|reply| Command::RemoteDbStore(peer, db, reply)).await
    }

    pub async fn remote_db_retrieve(&self, peer: PeerId) -> Result<RemoteGattDb, ServiceError> {
        self.request(|reply| Command::RemoteDbRetrieve(peer, reply)).await
    }

    pub async fn is_pending(&self, conn: ConnHandle, procedure: Procedure) -> Result<bool, ServiceError> {
        self.request(|reply| Command::IsPending(conn, procedure, reply)).await
    }

    /// Stop the service task. Queued commands that have not run are dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
