//! Client-side lobby cache kept in sync by applying server events.
//!
//! Every update is idempotent: applying the same event twice leaves the view
//! as applying it once.

use crate::{
    dto::{
        game::{GameView, PlayerEvent},
        ws::ServerMessage,
    },
    state::game::{GameId, GameStatus, UserId},
};

/// Local mirror of the lobby list and of the game the client sits in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbyView {
    games: Vec<GameView>,
    current_game: Option<GameView>,
}

impl LobbyView {
    /// Empty view, before any `games_list` arrived.
    pub fn new() -> Self {
        Self::default()
    }

    /// Known games in lobby order.
    pub fn games(&self) -> &[GameView] {
        &self.games
    }

    /// Game the client joined, if any.
    pub fn current_game(&self) -> Option<&GameView> {
        self.current_game.as_ref()
    }

    /// Replace the whole list.
    pub fn set_games(&mut self, games: Vec<GameView>) {
        self.games = games;
    }

    /// Clear the list.
    pub fn reset_games(&mut self) {
        self.games.clear();
    }

    /// Insert a game, replacing an entry with the same id.
    pub fn add_game(&mut self, game: GameView) {
        match self.games.iter_mut().find(|known| known.id == game.id) {
            Some(known) => *known = game,
            None => self.games.push(game),
        }
    }

    /// Drop a game from the list and forget it as current game.
    pub fn delete_game(&mut self, id: GameId) {
        self.games.retain(|game| game.id != id);
        if self.current_game.as_ref().is_some_and(|game| game.id == id) {
            self.current_game = None;
        }
    }

    /// Select the game the client sits in.
    pub fn set_current_game(&mut self, game: Option<GameView>) {
        self.current_game = game;
    }

    /// Update the status of the current game; ignored without one.
    pub fn set_current_game_status(&mut self, status: GameStatus) {
        if let Some(game) = self.current_game.as_mut() {
            game.status = status;
        }
    }

    /// Fold one server event into the view.
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::GamesList(games) => self.set_games(games.clone()),
            ServerMessage::GameCreated(game) => self.add_game(game.clone()),
            ServerMessage::GameDeleted(id) => self.delete_game(*id),
            ServerMessage::GameJoined(game) => {
                self.add_game(game.clone());
                self.set_current_game(Some(game.clone()));
            }
            ServerMessage::PlayerJoined(event) => {
                self.for_game(event.game_id, |game| upsert_player(game, event));
            }
            ServerMessage::PlayerRemoved(event) => {
                self.for_game(event.game_id, |game| {
                    game.players
                        .retain(|player| player.user_id != event.player.user_id)
                });
            }
            ServerMessage::PlayerReconnected(user) => self.set_connected(user, true),
            ServerMessage::PlayerDisconnected(user) => self.set_connected(user, false),
            ServerMessage::GameStatusChanged(change) => {
                self.for_game(change.game_id, |game| game.status = change.status);
            }
            ServerMessage::Error(_) => {}
        }
    }

    fn for_game(&mut self, id: GameId, mut update: impl FnMut(&mut GameView)) {
        self.games
            .iter_mut()
            .chain(self.current_game.iter_mut())
            .filter(|game| game.id == id)
            .for_each(|game| update(game));
    }

    // Presence events carry no game id; they concern the current game.
    fn set_connected(&mut self, user: &UserId, connected: bool) {
        let Some(id) = self.current_game.as_ref().map(|game| game.id) else {
            return;
        };
        self.for_game(id, |game| {
            if let Some(player) = game.players.iter_mut().find(|p| &p.user_id == user) {
                player.connected = connected;
            }
        });
    }
}

fn upsert_player(game: &mut GameView, event: &PlayerEvent) {
    match game
        .players
        .iter_mut()
        .find(|player| player.user_id == event.player.user_id)
    {
        Some(player) => *player = event.player.clone(),
        None => game.players.push(event.player.clone()),
    }
}
