use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dao::models::GameEntity,
    services::{fanout, session_service},
    state::{SharedState, game::GameId},
};

const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// A committed registry change waiting to be written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// Upsert the full game document.
    Save(GameEntity),
    /// Remove the game document.
    Delete(GameId),
}

impl StoreChange {
    /// Game the change applies to.
    pub fn game_id(&self) -> GameId {
        match self {
            StoreChange::Save(entity) => entity.id,
            StoreChange::Delete(id) => *id,
        }
    }
}

/// Ordered queue of pending writes; a newer change to the same game supersedes the older one.
#[derive(Debug, Default)]
struct PendingWrites {
    changes: IndexMap<GameId, StoreChange>,
}

impl PendingWrites {
    fn push(&mut self, change: StoreChange) {
        let id = change.game_id();
        self.changes.shift_remove(&id);
        self.changes.insert(id, change);
    }

    fn front(&self) -> Option<&StoreChange> {
        self.changes.get_index(0).map(|(_, change)| change)
    }

    fn pop_front(&mut self) {
        self.changes.shift_remove_index(0);
    }

    fn len(&self) -> usize {
        self.changes.len()
    }

    fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Single writer applying committed changes to the game store in commit order.
///
/// Changes made while the store is unreachable are kept and flushed once it
/// comes back; every (re)connection then hydrates the registry with persisted
/// games that are not in memory.
pub async fn run_writer(state: SharedState) {
    let Some(mut queue) = state.take_persist_queue().await else {
        warn!("storage writer already running");
        return;
    };

    if !state.config().storage.enabled() {
        info!("no storage configured; running memory-only");
        while queue.recv().await.is_some() {}
        return;
    }

    let mut degraded = state.degraded_watcher();
    let mut pending = PendingWrites::default();
    let mut retry = interval(RETRY_INTERVAL);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // A store installed before this task started never shows up as a change.
    let connected = !*degraded.borrow_and_update();
    if connected && state.game_store().await.is_some() {
        hydrate(&state).await;
    }

    loop {
        tokio::select! {
            change = queue.recv() => {
                let Some(change) = change else { break };
                pending.push(change);
                flush(&state, &mut pending).await;
            }
            changed = degraded.changed() => {
                if changed.is_err() {
                    break;
                }
                let is_degraded = *degraded.borrow_and_update();
                if !is_degraded && flush(&state, &mut pending).await {
                    hydrate(&state).await;
                }
            }
            _ = retry.tick(), if !pending.is_empty() => {
                flush(&state, &mut pending).await;
            }
        }
    }
}

/// Write pending changes in order; returns true once the queue is empty.
async fn flush(state: &SharedState, pending: &mut PendingWrites) -> bool {
    let Some(store) = state.game_store().await else {
        debug!(pending = pending.len(), "storage offline; keeping pending writes");
        return pending.is_empty();
    };

    while let Some(change) = pending.front().cloned() {
        let result = match change {
            StoreChange::Save(entity) => store.save_game(entity).await,
            StoreChange::Delete(id) => store.delete_game(id).await.map(|_| ()),
        };

        if let Err(err) = result {
            warn!(error = %err, pending = pending.len(), "failed to persist game change; will retry");
            return false;
        }
        pending.pop_front();
    }

    true
}

/// Load persisted games absent from memory into the registry.
pub async fn hydrate(state: &SharedState) {
    let Some(store) = state.game_store().await else {
        return;
    };

    let entities = match store.list_games().await {
        Ok(entities) => entities,
        Err(err) => {
            warn!(error = %err, "failed to load persisted games");
            return;
        }
    };

    let dispatches = session_service::restore_games(state, entities).await;
    if !dispatches.is_empty() {
        info!(restored = dispatches.len(), "hydrated registry from storage");
    }
    fanout::deliver(state, dispatches);
}
