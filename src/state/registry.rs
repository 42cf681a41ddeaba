//! Authoritative in-memory store of every game and its players.

use std::{collections::HashSet, time::Instant};

use indexmap::IndexMap;
use thiserror::Error;

use crate::state::game::{ConnectionId, Game, GameId, GameStatus, Player, UserId};

/// Errors raised by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No game is registered under this identifier.
    #[error("game `{0}` not found")]
    GameNotFound(GameId),
    /// The game exists but the user holds no seat in it.
    #[error("player `{user_id}` is not a member of game `{game_id}`")]
    PlayerNotFound {
        /// Game that was searched.
        game_id: GameId,
        /// User that was expected.
        user_id: UserId,
    },
    /// The user already holds a seat in the game.
    #[error("player `{user_id}` already joined game `{game_id}`")]
    AlreadyMember {
        /// Game that was joined.
        game_id: GameId,
        /// User already seated.
        user_id: UserId,
    },
    /// The configured game limit has been reached.
    #[error("game limit of {limit} reached")]
    Exhausted {
        /// Maximum number of concurrent games.
        limit: usize,
    },
}

/// Insertion-ordered collection of games.
///
/// Deleted ids are remembered so a stale storage snapshot cannot bring them back.
#[derive(Debug, Default)]
pub struct GameRegistry {
    games: IndexMap<GameId, Game>,
    deleted: HashSet<GameId>,
    max_games: Option<usize>,
}

impl GameRegistry {
    /// Build an empty registry accepting at most `max_games` concurrent games.
    pub fn new(max_games: Option<usize>) -> Self {
        Self {
            games: IndexMap::new(),
            deleted: HashSet::new(),
            max_games,
        }
    }

    /// Number of games currently registered.
    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// Whether the registry holds no game.
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Allocate a new waiting game with no players.
    pub fn create_game(&mut self) -> Result<Game, RegistryError> {
        if let Some(limit) = self.max_games {
            if self.games.len() >= limit {
                return Err(RegistryError::Exhausted { limit });
            }
        }

        let game = Game::new();
        self.games.insert(game.id, game.clone());
        Ok(game)
    }

    /// Borrow a game by identifier.
    pub fn get_game(&self, id: GameId) -> Result<&Game, RegistryError> {
        self.games.get(&id).ok_or(RegistryError::GameNotFound(id))
    }

    /// Snapshot every game in creation order.
    pub fn list_games(&self) -> Vec<Game> {
        self.games.values().cloned().collect()
    }

    /// Remove a game together with all its player records.
    pub fn delete_game(&mut self, id: GameId) -> Result<Game, RegistryError> {
        let game = self
            .games
            .shift_remove(&id)
            .ok_or(RegistryError::GameNotFound(id))?;
        self.deleted.insert(id);
        Ok(game)
    }

    /// Seat `user_id` in the game, refusing duplicates.
    pub fn add_player(
        &mut self,
        id: GameId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<&Game, RegistryError> {
        let game = self.game_mut(id)?;
        if game.has_player(&user_id) {
            return Err(RegistryError::AlreadyMember {
                game_id: id,
                user_id,
            });
        }

        game.players.push(Player::new(user_id, connection_id));
        debug_assert!(game.members_are_unique(), "duplicate member in game {id}");
        Ok(game)
    }

    /// Remove the seat of `user_id`; an emptied game is kept.
    pub fn remove_player(&mut self, id: GameId, user_id: &UserId) -> Result<Player, RegistryError> {
        let game = self.game_mut(id)?;
        let index = game
            .players
            .iter()
            .position(|player| &player.user_id == user_id)
            .ok_or_else(|| RegistryError::PlayerNotFound {
                game_id: id,
                user_id: user_id.clone(),
            })?;

        Ok(game.players.remove(index))
    }

    /// Overwrite the status of a game.
    pub fn set_status(&mut self, id: GameId, status: GameStatus) -> Result<(), RegistryError> {
        self.game_mut(id)?.status = status;
        Ok(())
    }

    /// Attach a new connection to an existing seat, clearing the disconnect marker.
    pub fn reconnect_player(
        &mut self,
        id: GameId,
        user_id: &UserId,
        connection_id: ConnectionId,
    ) -> Result<&Game, RegistryError> {
        let game = self.game_mut(id)?;
        let player = game
            .player_mut(user_id)
            .ok_or_else(|| RegistryError::PlayerNotFound {
                game_id: id,
                user_id: user_id.clone(),
            })?;
        player.connection_id = Some(connection_id);
        player.disconnected_at = None;
        Ok(game)
    }

    /// Detach the connection of a seat while keeping the player record.
    pub fn mark_disconnected(
        &mut self,
        id: GameId,
        user_id: &UserId,
        at: Instant,
    ) -> Result<(), RegistryError> {
        let game = self.game_mut(id)?;
        let player = game
            .player_mut(user_id)
            .ok_or_else(|| RegistryError::PlayerNotFound {
                game_id: id,
                user_id: user_id.clone(),
            })?;
        player.connection_id = None;
        player.disconnected_at = Some(at);
        Ok(())
    }

    /// Whether `id` is live or was deleted.
    pub fn is_known(&self, id: GameId) -> bool {
        self.games.contains_key(&id) || self.deleted.contains(&id)
    }

    /// Mark a persisted game as deleted without it ever being live.
    pub fn retire(&mut self, id: GameId) {
        if !self.games.contains_key(&id) {
            self.deleted.insert(id);
        }
    }

    /// Insert a game loaded from storage unless its id is live or was deleted.
    pub fn restore(&mut self, game: Game) -> bool {
        if self.is_known(game.id) {
            return false;
        }
        debug_assert!(game.members_are_unique(), "restored game {} has duplicates", game.id);
        self.games.insert(game.id, game);
        true
    }

    fn game_mut(&mut self, id: GameId) -> Result<&mut Game, RegistryError> {
        self.games
            .get_mut(&id)
            .ok_or(RegistryError::GameNotFound(id))
    }
}
