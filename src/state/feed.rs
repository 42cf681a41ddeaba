use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Lobby-wide events fanned out to every SSE subscriber.
///
/// Publishing never blocks; a subscriber that falls `capacity` events behind
/// skips ahead and is told how many it missed.
pub struct LobbyFeed {
    sender: broadcast::Sender<ServerEvent>,
}

impl LobbyFeed {
    /// Feed keeping up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::channel(capacity).0,
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; returns how many received it.
    pub fn publish(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of live subscribers.
    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}
