use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageError},
    state::SharedState,
};

const FIRST_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const RECONNECT_ATTEMPTS: u32 = 3;

/// Doubling delay between connection attempts, capped at [`MAX_BACKOFF`].
#[derive(Debug)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: FIRST_BACKOFF,
        }
    }

    fn reset(&mut self) {
        self.next = FIRST_BACKOFF;
    }

    fn advance(&mut self) -> Duration {
        let current = self.next;
        self.next = (current * 2).min(MAX_BACKOFF);
        current
    }
}

/// Keep a game store installed for the lobby, connecting with `connect` until one answers.
///
/// The lobby stays degraded while no store is reachable. A store that cannot be
/// recovered is dropped and a fresh one is requested.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn GameStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::new();

    loop {
        match connect().await {
            Ok(store) => {
                state.set_game_store(store.clone()).await;
                info!("game store connected; lobby changes are persisted again");
                backoff.reset();

                watch(&state, store.as_ref()).await;

                warn!("game store lost for good; dropping it and reconnecting from scratch");
                state.clear_game_store().await;
            }
            Err(err) => warn!(error = %err, "game store connection failed"),
        }
        sleep(backoff.advance()).await;
    }
}

/// Poll the store until it stays unreachable through every reconnect attempt.
async fn watch(state: &SharedState, store: &dyn GameStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded() {
                info!("game store healthy; leaving degraded mode");
                state.update_degraded(false);
            }
        } else if !recover(state, store).await {
            return;
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Try to reconnect a failing store; the lobby turns degraded after the first miss.
async fn recover(state: &SharedState, store: &dyn GameStore) -> bool {
    let mut backoff = Backoff::new();

    for attempt in 1..=RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "game store reconnected");
                state.update_degraded(false);
                return true;
            }
            Err(err) => {
                if attempt == 1 {
                    state.update_degraded(true);
                }
                warn!(attempt, error = %err, "game store reconnect failed; lobby degraded");
                sleep(backoff.advance()).await;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut backoff = Backoff::new();
        let delays: Vec<u64> = (0..6).map(|_| backoff.advance().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);

        backoff.reset();
        assert_eq!(backoff.advance(), FIRST_BACKOFF);
    }
}
