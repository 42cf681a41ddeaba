//! Routing back-references between connections, users and games.
//!
//! The tracker never owns game or player lifecycle; it only mirrors what the
//! session coordinator committed to the registry so broadcasts can be targeted
//! and disconnects cleaned up.

use std::collections::HashMap;

use indexmap::IndexSet;
use thiserror::Error;

use crate::state::game::{ConnectionId, GameId, UserId};

/// Errors raised when binding identities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenceError {
    /// The connection was never registered or is already gone.
    #[error("connection `{0}` is not registered")]
    UnknownConnection(ConnectionId),
    /// The connection already speaks for another user.
    #[error("connection is bound to user `{bound}`, not `{requested}`")]
    UserMismatch {
        /// User bound to the connection.
        bound: UserId,
        /// User requested by the operation.
        requested: UserId,
    },
}

/// What a disconnect leaves behind for the coordinator to clean up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Connection that went away.
    pub connection: ConnectionId,
    /// User bound to the connection, if it ever authenticated.
    pub user: Option<UserId>,
    /// Games the connection was seated in.
    pub games: Vec<GameId>,
}

#[derive(Debug, Default)]
struct ConnectionPresence {
    user: Option<UserId>,
    games: IndexSet<GameId>,
}

/// Connection ↔ user ↔ game tracker.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    connections: HashMap<ConnectionId, ConnectionPresence>,
    memberships: HashMap<UserId, IndexSet<GameId>>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly upgraded connection.
    pub fn register(&mut self, connection: ConnectionId) {
        self.connections.entry(connection).or_default();
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Bind `user` to `connection`; rebinding the same user is accepted.
    pub fn bind_user(&mut self, connection: ConnectionId, user: &UserId) -> Result<(), PresenceError> {
        let entry = self
            .connections
            .get_mut(&connection)
            .ok_or(PresenceError::UnknownConnection(connection))?;

        match &entry.user {
            Some(bound) if bound != user => Err(PresenceError::UserMismatch {
                bound: bound.clone(),
                requested: user.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                entry.user = Some(user.clone());
                Ok(())
            }
        }
    }

    /// User bound to `connection`, if any.
    pub fn user_of(&self, connection: ConnectionId) -> Option<&UserId> {
        self.connections
            .get(&connection)
            .and_then(|entry| entry.user.as_ref())
    }

    /// Record that `user` now holds a seat in `game` through `connection`.
    pub fn join(&mut self, connection: ConnectionId, user: &UserId, game: GameId) {
        if let Some(entry) = self.connections.get_mut(&connection) {
            entry.games.insert(game);
        }
        self.add_membership(user, game);
    }

    /// Record a membership without any live connection, as after a restart.
    pub fn add_membership(&mut self, user: &UserId, game: GameId) {
        self.memberships
            .entry(user.clone())
            .or_default()
            .insert(game);
    }

    /// Stop routing member broadcasts of `game` to `connection`.
    pub fn unsubscribe(&mut self, connection: ConnectionId, game: GameId) {
        if let Some(entry) = self.connections.get_mut(&connection) {
            entry.games.shift_remove(&game);
        }
    }

    /// Forget that `user` is a member of `game`.
    pub fn leave(&mut self, user: &UserId, game: GameId) {
        if let Some(games) = self.memberships.get_mut(user) {
            games.shift_remove(&game);
            if games.is_empty() {
                self.memberships.remove(user);
            }
        }
    }

    /// Drop every reference to a deleted game.
    pub fn forget_game(&mut self, game: GameId) {
        for entry in self.connections.values_mut() {
            entry.games.shift_remove(&game);
        }
        self.memberships.retain(|_, games| {
            games.shift_remove(&game);
            !games.is_empty()
        });
    }

    /// Games `user` currently belongs to, in join order.
    pub fn games_of(&self, user: &UserId) -> Vec<GameId> {
        self.memberships
            .get(user)
            .map(|games| games.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Games `connection` receives member broadcasts for.
    pub fn games_of_connection(&self, connection: ConnectionId) -> Vec<GameId> {
        self.connections
            .get(&connection)
            .map(|entry| entry.games.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Connections subscribed to member broadcasts of `game`.
    pub fn subscribers(&self, game: GameId) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, entry)| entry.games.contains(&game))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every tracked connection.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Remove `connection` and report what it occupied.
    ///
    /// Returns `None` when the connection was already cleared, so repeated
    /// disconnect signals are harmless. Memberships are left to the caller,
    /// which decides whether the user keeps their seats.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<Departure> {
        let entry = self.connections.remove(&connection)?;
        Some(Departure {
            connection,
            user: entry.user,
            games: entry.games.into_iter().collect(),
        })
    }
}
