pub mod game;
pub mod presence;
pub mod registry;
mod feed;
pub mod state_machine;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard, mpsc, watch};

use crate::{
    config::AppConfig,
    dao::game_store::GameStore,
    services::persistence::StoreChange,
    state::{game::ConnectionId, presence::PresenceTracker, registry::GameRegistry},
};

pub use self::feed::LobbyFeed;

/// Handle to the application state shared by every task.
pub type SharedState = Arc<AppState>;

const LOBBY_FEED_CAPACITY: usize = 64;

#[derive(Clone)]
/// Handle used to push messages to a connected lobby client.
pub struct ClientConnection {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Queue of the socket writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Write access to the registry and the presence tracker, acquired in that order.
///
/// Holding a `SessionGuard` makes a coordinator operation atomic with respect to
/// every other operation.
pub struct SessionGuard<'a> {
    /// Game registry, locked first.
    pub registry: RwLockWriteGuard<'a, GameRegistry>,
    /// Presence tracker, locked second.
    pub presence: RwLockWriteGuard<'a, PresenceTracker>,
}

/// Central application state storing the registry, live connections and storage handles.
pub struct AppState {
    config: AppConfig,
    registry: RwLock<GameRegistry>,
    presence: RwLock<PresenceTracker>,
    connections: DashMap<ConnectionId, ClientConnection>,
    lobby_feed: LobbyFeed,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    persist_tx: mpsc::UnboundedSender<StoreChange>,
    persist_rx: Mutex<Option<mpsc::UnboundedReceiver<StoreChange>>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// When storage is configured the application starts degraded until a store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(config.storage.enabled());
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            registry: RwLock::new(GameRegistry::new(config.session.max_games)),
            presence: RwLock::new(PresenceTracker::new()),
            connections: DashMap::new(),
            lobby_feed: LobbyFeed::new(LOBBY_FEED_CAPACITY),
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            persist_tx,
            persist_rx: Mutex::new(Some(persist_rx)),
            config,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Shared registry, for read-only snapshots.
    pub fn registry(&self) -> &RwLock<GameRegistry> {
        &self.registry
    }

    /// Shared presence tracker, for read-only lookups.
    pub fn presence(&self) -> &RwLock<PresenceTracker> {
        &self.presence
    }

    /// Lock registry and presence for a mutating session operation.
    pub async fn session(&self) -> SessionGuard<'_> {
        let registry = self.registry.write().await;
        let presence = self.presence.write().await;
        SessionGuard { registry, presence }
    }

    /// Routing table of live sockets keyed by connection identifier.
    pub fn connections(&self) -> &DashMap<ConnectionId, ClientConnection> {
        &self.connections
    }

    /// Lobby events mirrored to SSE subscribers.
    pub fn lobby_feed(&self) -> &LobbyFeed {
        &self.lobby_feed
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Queue a committed change for the storage writer.
    pub fn persist(&self, change: StoreChange) {
        let _ = self.persist_tx.send(change);
    }

    /// Hand the storage queue to the writer task; only the first caller gets it.
    pub async fn take_persist_queue(&self) -> Option<mpsc::UnboundedReceiver<StoreChange>> {
        self.persist_rx.lock().await.take()
    }
}
