//! Session coordinator: validates lobby events, commits them to the registry
//! and the presence tracker, and describes who has to be told about it.
//!
//! Every operation runs under [`AppState::session`](crate::state::AppState::session)
//! and returns the [`Dispatch`] list to deliver once the locks are released.

use std::time::Instant;

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::GameEntity,
    dto::{
        game::{GameView, PlayerEvent, StatusChange},
        validation::validate_user_id,
        ws::{ClientMessage, GameRef, JoinGame, PlayerRef, ServerMessage},
    },
    error::ServiceError,
    services::{fanout, persistence::StoreChange},
    state::{
        SessionGuard, SharedState,
        game::{ConnectionId, Game, GameId, GameStatus, UserId},
        presence::PresenceTracker,
        registry::{GameRegistry, RegistryError},
        state_machine::{StatusEvent, next_status},
    },
};

/// Who receives a server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Only this connection.
    Connection(ConnectionId),
    /// The listed connections.
    Connections(Vec<ConnectionId>),
    /// Every live connection, mirrored to the lobby SSE stream.
    Everyone,
}

/// A server message together with its audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Recipients.
    pub audience: Audience,
    /// Event to deliver.
    pub message: ServerMessage,
}

impl Dispatch {
    /// Address `message` to a single connection.
    pub fn to(connection: ConnectionId, message: ServerMessage) -> Self {
        Self {
            audience: Audience::Connection(connection),
            message,
        }
    }

    /// Address `message` to every live connection.
    pub fn everyone(message: ServerMessage) -> Self {
        Self {
            audience: Audience::Everyone,
            message,
        }
    }

    /// Address `message` to game members; `None` when nobody is listening.
    pub fn members(connections: Vec<ConnectionId>, message: ServerMessage) -> Option<Self> {
        if connections.is_empty() {
            return None;
        }
        Some(Self {
            audience: Audience::Connections(connections),
            message,
        })
    }
}

/// Outcome of a coordinator operation.
pub type SessionResult = Result<Vec<Dispatch>, ServiceError>;

/// Route a parsed client event to the matching operation.
pub async fn handle_message(
    state: &SharedState,
    connection: ConnectionId,
    message: ClientMessage,
) -> SessionResult {
    match message {
        ClientMessage::ViewGames => view_games(state, connection).await,
        ClientMessage::CreateGame => create_game(state).await,
        ClientMessage::DeleteGame(GameRef { game_id }) => delete_game(state, &game_id).await,
        ClientMessage::JoinGame(JoinGame { game_id, user_id }) => {
            join_game(state, connection, &game_id, &user_id).await
        }
        ClientMessage::RemovePlayer(PlayerRef { game_id, user_id }) => {
            remove_player(state, connection, &game_id, &user_id).await
        }
        ClientMessage::LeaveGame(GameRef { game_id }) => {
            leave_game(state, connection, &game_id).await
        }
        ClientMessage::StartGame(GameRef { game_id }) => start_game(state, &game_id).await,
        ClientMessage::FinishGame(GameRef { game_id }) => finish_game(state, &game_id).await,
    }
}

/// Start tracking a new connection, optionally bound to a user up front.
pub async fn register_connection(
    state: &SharedState,
    connection: ConnectionId,
    user_id: Option<&str>,
) -> Result<(), ServiceError> {
    let user = user_id.map(parse_user_id).transpose()?;
    let mut presence = state.presence().write().await;
    presence.register(connection);
    if let Some(user) = user {
        presence.bind_user(connection, &user)?;
        debug!(connection = %connection, user_id = %user, "connection bound at upgrade");
    }
    Ok(())
}

/// Answer with a snapshot of every game.
pub async fn view_games(state: &SharedState, connection: ConnectionId) -> SessionResult {
    let games = state.registry().read().await.list_games();
    let views = games.iter().map(GameView::from).collect();
    Ok(vec![Dispatch::to(connection, ServerMessage::GamesList(views))])
}

/// Create an empty waiting game and announce it to everyone.
pub async fn create_game(state: &SharedState) -> SessionResult {
    let mut registry = state.registry().write().await;
    let game = registry.create_game()?;
    state.persist(StoreChange::Save((&game).into()));
    info!(game_id = %game.id, games = registry.len(), "game created");

    Ok(vec![Dispatch::everyone(ServerMessage::GameCreated(
        game.into(),
    ))])
}

/// Seat a user in a game, or rebind a disconnected member to a new connection.
pub async fn join_game(
    state: &SharedState,
    connection: ConnectionId,
    game_id: &str,
    user_id: &str,
) -> SessionResult {
    let game_id = parse_game_id(game_id)?;
    let user = parse_user_id(user_id)?;
    let policy = &state.config().session;
    let SessionGuard {
        mut registry,
        mut presence,
    } = state.session().await;

    let game = registry.get_game(game_id)?;
    if let Some(player) = game.player(&user) {
        if player.is_connected() {
            return Err(RegistryError::AlreadyMember {
                game_id,
                user_id: user,
            }
            .into());
        }

        presence.bind_user(connection, &user)?;
        let game = registry.reconnect_player(game_id, &user, connection)?;
        let view = GameView::from(game);
        presence.join(connection, &user, game_id);
        info!(game_id = %game_id, user_id = %user, connection = %connection, "player rejoined");

        let others = other_members(&presence, game_id, connection);
        let mut dispatches = vec![Dispatch::to(connection, ServerMessage::GameJoined(view))];
        dispatches.extend(Dispatch::members(
            others,
            ServerMessage::PlayerReconnected(user),
        ));
        return Ok(dispatches);
    }

    if game.status != GameStatus::Waiting && !policy.allow_late_join {
        return Err(ServiceError::InvalidState(format!(
            "game `{game_id}` is {}; joining is closed",
            game.status
        )));
    }

    if policy.single_game_per_user {
        let busy = presence
            .games_of(&user)
            .into_iter()
            .filter(|other| *other != game_id)
            .find(|other| {
                registry
                    .get_game(*other)
                    .is_ok_and(|game| game.status != GameStatus::Finished)
            });
        if let Some(other) = busy {
            return Err(ServiceError::InvalidState(format!(
                "user `{user}` already plays in game `{other}`"
            )));
        }
    }

    presence.bind_user(connection, &user)?;
    let game = registry.add_player(game_id, user.clone(), connection)?;
    state.persist(StoreChange::Save(game.into()));
    let view = GameView::from(game);
    let joined = game
        .player(&user)
        .map(|player| PlayerEvent::new(game_id, player));
    presence.join(connection, &user, game_id);
    info!(game_id = %game_id, user_id = %user, connection = %connection, "player joined");

    let mut dispatches = vec![Dispatch::to(connection, ServerMessage::GameJoined(view))];
    if let Some(joined) = joined {
        let others = other_members(&presence, game_id, connection);
        dispatches.extend(Dispatch::members(
            others,
            ServerMessage::PlayerJoined(joined),
        ));
    }
    Ok(dispatches)
}

/// Take a player's seat away; members and the requester are notified.
pub async fn remove_player(
    state: &SharedState,
    connection: ConnectionId,
    game_id: &str,
    user_id: &str,
) -> SessionResult {
    let game_id = parse_game_id(game_id)?;
    let user = UserId::new(user_id.trim());
    let SessionGuard {
        mut registry,
        mut presence,
    } = state.session().await;

    let dispatches = remove_member(
        state,
        &mut registry,
        &mut presence,
        game_id,
        &user,
        Some(connection),
    )?;
    info!(game_id = %game_id, user_id = %user, connection = %connection, "player removed");
    Ok(dispatches)
}

/// Remove the user bound to `connection` from a game.
pub async fn leave_game(
    state: &SharedState,
    connection: ConnectionId,
    game_id: &str,
) -> SessionResult {
    let game_id = parse_game_id(game_id)?;
    let SessionGuard {
        mut registry,
        mut presence,
    } = state.session().await;

    let user = presence
        .user_of(connection)
        .cloned()
        .ok_or_else(|| ServiceError::Unauthorized("connection has no bound user".into()))?;
    let dispatches = remove_member(
        state,
        &mut registry,
        &mut presence,
        game_id,
        &user,
        Some(connection),
    )?;
    info!(game_id = %game_id, user_id = %user, "player left");
    Ok(dispatches)
}

/// Delete a game with all its players and announce it to everyone.
pub async fn delete_game(state: &SharedState, game_id: &str) -> SessionResult {
    let game_id = parse_game_id(game_id)?;
    let SessionGuard {
        mut registry,
        mut presence,
    } = state.session().await;

    let game = registry.delete_game(game_id)?;
    presence.forget_game(game_id);
    state.persist(StoreChange::Delete(game_id));
    info!(game_id = %game_id, players = game.players.len(), "game deleted");

    Ok(vec![Dispatch::everyone(ServerMessage::GameDeleted(game_id))])
}

/// Move a waiting game to `in_progress`.
pub async fn start_game(state: &SharedState, game_id: &str) -> SessionResult {
    change_status(state, game_id, StatusEvent::Start).await
}

/// Close a waiting or running game.
pub async fn finish_game(state: &SharedState, game_id: &str) -> SessionResult {
    change_status(state, game_id, StatusEvent::Finish).await
}

async fn change_status(state: &SharedState, game_id: &str, event: StatusEvent) -> SessionResult {
    let game_id = parse_game_id(game_id)?;
    let mut registry = state.registry().write().await;

    let current = registry.get_game(game_id)?.status;
    let status = next_status(current, event)?;
    registry.set_status(game_id, status)?;
    state.persist(StoreChange::Save(registry.get_game(game_id)?.into()));
    info!(game_id = %game_id, from = %current, to = %status, "game status changed");

    Ok(vec![Dispatch::everyone(ServerMessage::GameStatusChanged(
        StatusChange { game_id, status },
    ))])
}

/// Clean up after a connection went away.
///
/// Seats are released at once or kept for the configured grace period. A
/// second call for the same connection yields nothing.
pub async fn disconnect(state: &SharedState, connection: ConnectionId) -> Vec<Dispatch> {
    let policy = &state.config().session;
    let SessionGuard {
        mut registry,
        mut presence,
    } = state.session().await;

    let Some(departure) = presence.disconnect(connection) else {
        debug!(connection = %connection, "connection already cleared");
        return Vec::new();
    };
    let Some(user) = departure.user else {
        return Vec::new();
    };

    let now = Instant::now();
    let mut dispatches = Vec::new();
    for game_id in departure.games {
        let seated_here = registry
            .get_game(game_id)
            .ok()
            .and_then(|game| game.player(&user))
            .is_some_and(|player| player.connection_id == Some(connection));
        if !seated_here {
            continue;
        }

        let members = presence.subscribers(game_id);
        if policy.retains_disconnected() {
            if let Err(err) = registry.mark_disconnected(game_id, &user, now) {
                warn!(game_id = %game_id, user_id = %user, error = %err, "failed to mark player disconnected");
                continue;
            }
            schedule_expiry(state, game_id, user.clone(), now);
            dispatches.extend(Dispatch::members(
                members,
                ServerMessage::PlayerDisconnected(user.clone()),
            ));
        } else {
            if let Err(err) = registry.remove_player(game_id, &user) {
                warn!(game_id = %game_id, user_id = %user, error = %err, "failed to remove disconnected player");
                continue;
            }
            presence.leave(&user, game_id);
            dispatches.extend(Dispatch::members(
                members,
                ServerMessage::PlayerDisconnected(user.clone()),
            ));
            match settle_after_removal(state, &mut registry, &mut presence, game_id) {
                Ok(extra) => dispatches.extend(extra),
                Err(err) => warn!(game_id = %game_id, error = %err, "failed to settle game after disconnect"),
            }
        }
    }

    info!(connection = %connection, user_id = %user, "connection cleaned up");
    dispatches
}

/// Remove a disconnected player whose grace period started at `since`.
///
/// Does nothing when the player rejoined or was removed in the meantime.
pub async fn expire_player(
    state: &SharedState,
    game_id: GameId,
    user: &UserId,
    since: Instant,
) -> Vec<Dispatch> {
    let SessionGuard {
        mut registry,
        mut presence,
    } = state.session().await;

    let still_away = registry
        .get_game(game_id)
        .ok()
        .and_then(|game| game.player(user))
        .is_some_and(|player| player.disconnected_at == Some(since));
    if !still_away {
        debug!(game_id = %game_id, user_id = %user, "grace expiry skipped; player came back or left");
        return Vec::new();
    }

    match remove_member(state, &mut registry, &mut presence, game_id, user, None) {
        Ok(dispatches) => {
            info!(game_id = %game_id, user_id = %user, "grace period elapsed; player removed");
            dispatches
        }
        Err(err) => {
            warn!(game_id = %game_id, user_id = %user, error = %err, "failed to expire player");
            Vec::new()
        }
    }
}

/// Insert persisted games missing from memory; restored players start disconnected.
///
/// Games deleted since the snapshot was taken stay deleted. Without a grace
/// period restored seats are dropped, and a game left empty that way is
/// deleted when empty games are not kept.
pub async fn restore_games(state: &SharedState, entities: Vec<GameEntity>) -> Vec<Dispatch> {
    let policy = &state.config().session;
    let SessionGuard {
        mut registry,
        mut presence,
    } = state.session().await;

    let now = Instant::now();
    let mut dispatches = Vec::new();
    for entity in entities {
        if registry.is_known(entity.id) {
            continue;
        }

        let mut game = Game::restored(entity, now);
        let game_id = game.id;
        let dropped_seats = !policy.retains_disconnected() && !game.players.is_empty();
        if dropped_seats {
            if policy.delete_empty_games {
                registry.retire(game_id);
                state.persist(StoreChange::Delete(game_id));
                info!(game_id = %game_id, "persisted game has no seat left; deleted");
                continue;
            }
            game.players.clear();
        }

        let members: Vec<UserId> = game
            .players
            .iter()
            .map(|player| player.user_id.clone())
            .collect();
        let view = GameView::from(&game);
        if !registry.restore(game) {
            continue;
        }

        if dropped_seats {
            if let Ok(game) = registry.get_game(game_id) {
                state.persist(StoreChange::Save(game.into()));
            }
        }
        for user in members {
            presence.add_membership(&user, game_id);
            schedule_expiry(state, game_id, user, now);
        }
        debug!(game_id = %game_id, "restored game from storage");
        dispatches.push(Dispatch::everyone(ServerMessage::GameCreated(view)));
    }

    dispatches
}

fn schedule_expiry(state: &SharedState, game_id: GameId, user: UserId, since: Instant) {
    let state = state.clone();
    let grace = state.config().session.disconnect_grace;
    tokio::spawn(async move {
        sleep(grace).await;
        let dispatches = expire_player(&state, game_id, &user, since).await;
        fanout::deliver(&state, dispatches);
    });
}

/// Drop `user` from a game, notifying every subscriber plus `requester`.
fn remove_member(
    state: &SharedState,
    registry: &mut GameRegistry,
    presence: &mut PresenceTracker,
    game_id: GameId,
    user: &UserId,
    requester: Option<ConnectionId>,
) -> SessionResult {
    let mut audience = presence.subscribers(game_id);
    let player = registry.remove_player(game_id, user)?;
    if let Some(connection) = player.connection_id {
        presence.unsubscribe(connection, game_id);
    }
    presence.leave(user, game_id);

    if let Some(requester) = requester {
        if !audience.contains(&requester) {
            audience.push(requester);
        }
    }

    let mut dispatches = Vec::new();
    dispatches.extend(Dispatch::members(
        audience,
        ServerMessage::PlayerRemoved(PlayerEvent::new(game_id, &player)),
    ));
    dispatches.extend(settle_after_removal(state, registry, presence, game_id)?);
    Ok(dispatches)
}

/// Persist a game that lost a player, deleting it when empty games are not kept.
fn settle_after_removal(
    state: &SharedState,
    registry: &mut GameRegistry,
    presence: &mut PresenceTracker,
    game_id: GameId,
) -> SessionResult {
    let game = registry.get_game(game_id)?;
    if !(state.config().session.delete_empty_games && game.players.is_empty()) {
        state.persist(StoreChange::Save(game.into()));
        return Ok(Vec::new());
    }

    registry.delete_game(game_id)?;
    presence.forget_game(game_id);
    state.persist(StoreChange::Delete(game_id));
    info!(game_id = %game_id, "empty game deleted");
    Ok(vec![Dispatch::everyone(ServerMessage::GameDeleted(game_id))])
}

fn other_members(
    presence: &PresenceTracker,
    game_id: GameId,
    connection: ConnectionId,
) -> Vec<ConnectionId> {
    presence
        .subscribers(game_id)
        .into_iter()
        .filter(|other| *other != connection)
        .collect()
}

fn parse_game_id(raw: &str) -> Result<GameId, ServiceError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::NotFound(format!("game `{raw}` not found")))
}

/// Surrounding whitespace is not part of a user id.
fn parse_user_id(raw: &str) -> Result<UserId, ServiceError> {
    let trimmed = raw.trim();
    validate_user_id(trimmed)
        .map_err(|_| ServiceError::Unauthorized("missing or invalid user id".into()))?;
    Ok(UserId::new(trimmed))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::{AppConfig, SessionPolicy},
        error::ErrorKind,
        state::AppState,
    };

    fn state_with(session: SessionPolicy) -> SharedState {
        AppState::new(AppConfig {
            session,
            ..AppConfig::default()
        })
    }

    fn instant_removal() -> SessionPolicy {
        SessionPolicy {
            disconnect_grace: Duration::ZERO,
            ..SessionPolicy::default()
        }
    }

    async fn connect(state: &SharedState) -> ConnectionId {
        let connection = Uuid::new_v4();
        register_connection(state, connection, None).await.unwrap();
        connection
    }

    async fn new_game(state: &SharedState) -> String {
        let dispatches = create_game(state).await.unwrap();
        match &dispatches[0].message {
            ServerMessage::GameCreated(game) => game.id.to_string(),
            other => panic!("unexpected message {other:?}"),
        }
    }

    async fn players_of(state: &SharedState, game_id: &str) -> Vec<(String, bool)> {
        let id = Uuid::parse_str(game_id).unwrap();
        state
            .registry()
            .read()
            .await
            .get_game(id)
            .unwrap()
            .players
            .iter()
            .map(|player| (player.user_id.to_string(), player.is_connected()))
            .collect()
    }

    #[tokio::test]
    async fn lobby_scenario_from_create_to_delete() {
        let state = state_with(SessionPolicy::default());
        let conn = connect(&state).await;

        let created = create_game(&state).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].audience, Audience::Everyone);
        let ServerMessage::GameCreated(game) = &created[0].message else {
            panic!("expected game_created");
        };
        assert!(game.players.is_empty());
        assert_eq!(game.status, GameStatus::Waiting);
        let game_id = game.id.to_string();

        let joined = join_game(&state, conn, &game_id, "u1").await.unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].audience, Audience::Connection(conn));
        let ServerMessage::GameJoined(view) = &joined[0].message else {
            panic!("expected game_joined");
        };
        assert_eq!(view.players.len(), 1);
        assert_eq!(view.players[0].user_id.as_str(), "u1");

        let err = join_game(&state, conn, &game_id, "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyMember);
        assert_eq!(players_of(&state, &game_id).await.len(), 1);

        let removed = remove_player(&state, conn, &game_id, "u1").await.unwrap();
        assert_eq!(removed[0].audience, Audience::Connections(vec![conn]));
        assert!(matches!(removed[0].message, ServerMessage::PlayerRemoved(_)));
        assert!(players_of(&state, &game_id).await.is_empty());

        let deleted = delete_game(&state, &game_id).await.unwrap();
        assert_eq!(deleted[0].audience, Audience::Everyone);
        assert!(matches!(deleted[0].message, ServerMessage::GameDeleted(_)));

        let err = join_game(&state, conn, &game_id, "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = remove_player(&state, conn, &game_id, "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn other_members_hear_about_new_players() {
        let state = state_with(SessionPolicy::default());
        let (a, b) = (connect(&state).await, connect(&state).await);
        let game_id = new_game(&state).await;

        join_game(&state, a, &game_id, "u1").await.unwrap();
        let dispatches = join_game(&state, b, &game_id, "u2").await.unwrap();

        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[1].audience, Audience::Connections(vec![a]));
        let ServerMessage::PlayerJoined(event) = &dispatches[1].message else {
            panic!("expected player_joined");
        };
        assert_eq!(event.player.user_id.as_str(), "u2");
    }

    #[tokio::test]
    async fn disconnect_notifies_each_game_once_and_clears_presence() {
        let state = state_with(instant_removal());
        let (a, b) = (connect(&state).await, connect(&state).await);
        let first = new_game(&state).await;
        let second = new_game(&state).await;
        for game_id in [&first, &second] {
            join_game(&state, a, game_id, "u1").await.unwrap();
            join_game(&state, b, game_id, "u2").await.unwrap();
        }

        let dispatches = disconnect(&state, a).await;

        assert_eq!(dispatches.len(), 2);
        for dispatch in &dispatches {
            assert_eq!(dispatch.audience, Audience::Connections(vec![b]));
            assert_eq!(
                dispatch.message,
                ServerMessage::PlayerDisconnected(UserId::from("u1"))
            );
        }
        assert!(state.presence().read().await.games_of(&UserId::from("u1")).is_empty());
        assert_eq!(players_of(&state, &first).await, vec![("u2".to_string(), true)]);
        assert_eq!(players_of(&state, &second).await, vec![("u2".to_string(), true)]);

        assert!(disconnect(&state, a).await.is_empty());
    }

    #[tokio::test]
    async fn disconnected_player_can_rejoin_within_grace() {
        let state = state_with(SessionPolicy::default());
        let (a, b) = (connect(&state).await, connect(&state).await);
        let game_id = new_game(&state).await;
        join_game(&state, a, &game_id, "u1").await.unwrap();
        join_game(&state, b, &game_id, "u2").await.unwrap();

        disconnect(&state, a).await;
        assert_eq!(
            players_of(&state, &game_id).await,
            vec![("u1".to_string(), false), ("u2".to_string(), true)]
        );

        let c = connect(&state).await;
        let dispatches = join_game(&state, c, &game_id, "u1").await.unwrap();

        assert!(matches!(dispatches[0].message, ServerMessage::GameJoined(_)));
        assert_eq!(dispatches[1].audience, Audience::Connections(vec![b]));
        assert_eq!(
            dispatches[1].message,
            ServerMessage::PlayerReconnected(UserId::from("u1"))
        );
        assert_eq!(
            players_of(&state, &game_id).await,
            vec![("u1".to_string(), true), ("u2".to_string(), true)]
        );
    }

    /// Let spawned timers register, move the paused clock, then run what fired.
    async fn elapse(duration: Duration) {
        tokio::task::yield_now().await;
        tokio::time::advance(duration).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn grace_expiry_removes_absent_player() {
        let state = state_with(SessionPolicy {
            disconnect_grace: Duration::from_millis(20),
            ..SessionPolicy::default()
        });
        let (a, b) = (connect(&state).await, connect(&state).await);
        let game_id = new_game(&state).await;
        join_game(&state, a, &game_id, "u1").await.unwrap();
        join_game(&state, b, &game_id, "u2").await.unwrap();

        disconnect(&state, a).await;
        elapse(Duration::from_millis(10)).await;
        assert_eq!(
            players_of(&state, &game_id).await,
            vec![("u1".to_string(), false), ("u2".to_string(), true)]
        );

        elapse(Duration::from_millis(20)).await;
        assert_eq!(players_of(&state, &game_id).await, vec![("u2".to_string(), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_cancels_pending_expiry() {
        let state = state_with(SessionPolicy {
            disconnect_grace: Duration::from_millis(50),
            ..SessionPolicy::default()
        });
        let a = connect(&state).await;
        let game_id = new_game(&state).await;
        join_game(&state, a, &game_id, "u1").await.unwrap();

        disconnect(&state, a).await;
        let c = connect(&state).await;
        join_game(&state, c, &game_id, "u1").await.unwrap();
        elapse(Duration::from_millis(200)).await;

        assert_eq!(players_of(&state, &game_id).await, vec![("u1".to_string(), true)]);
    }

    #[tokio::test]
    async fn late_join_requires_policy() {
        let state = state_with(SessionPolicy::default());
        let conn = connect(&state).await;
        let game_id = new_game(&state).await;
        start_game(&state, &game_id).await.unwrap();

        let err = join_game(&state, conn, &game_id, "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let lenient = state_with(SessionPolicy {
            allow_late_join: true,
            ..SessionPolicy::default()
        });
        let conn = connect(&lenient).await;
        let game_id = new_game(&lenient).await;
        start_game(&lenient, &game_id).await.unwrap();
        assert!(join_game(&lenient, conn, &game_id, "u1").await.is_ok());
    }

    #[tokio::test]
    async fn single_game_policy_rejects_second_unfinished_game() {
        let state = state_with(SessionPolicy {
            single_game_per_user: true,
            ..SessionPolicy::default()
        });
        let conn = connect(&state).await;
        let first = new_game(&state).await;
        let second = new_game(&state).await;
        join_game(&state, conn, &first, "u1").await.unwrap();

        let err = join_game(&state, conn, &second, "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        finish_game(&state, &first).await.unwrap();
        assert!(join_game(&state, conn, &second, "u1").await.is_ok());
    }

    #[tokio::test]
    async fn multiple_games_per_user_are_allowed_by_default() {
        let state = state_with(SessionPolicy::default());
        let conn = connect(&state).await;
        let first = new_game(&state).await;
        let second = new_game(&state).await;

        join_game(&state, conn, &first, "u1").await.unwrap();
        join_game(&state, conn, &second, "u1").await.unwrap();

        let games = state.presence().read().await.games_of(&UserId::from("u1"));
        assert_eq!(games.len(), 2);
    }

    #[tokio::test]
    async fn empty_games_are_deleted_when_configured() {
        let state = state_with(SessionPolicy {
            delete_empty_games: true,
            ..SessionPolicy::default()
        });
        let conn = connect(&state).await;
        let game_id = new_game(&state).await;
        join_game(&state, conn, &game_id, "u1").await.unwrap();

        let dispatches = leave_game(&state, conn, &game_id).await.unwrap();

        assert_eq!(dispatches.len(), 2);
        assert!(matches!(dispatches[0].message, ServerMessage::PlayerRemoved(_)));
        assert_eq!(dispatches[1].audience, Audience::Everyone);
        assert!(matches!(dispatches[1].message, ServerMessage::GameDeleted(_)));
        assert!(state.registry().read().await.is_empty());
    }

    #[tokio::test]
    async fn connection_cannot_speak_for_two_users() {
        let state = state_with(SessionPolicy::default());
        let conn = connect(&state).await;
        let game_id = new_game(&state).await;
        join_game(&state, conn, &game_id, "u1").await.unwrap();

        let err = join_game(&state, conn, &game_id, "u2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let bound = Uuid::new_v4();
        register_connection(&state, bound, Some("u3")).await.unwrap();
        let err = join_game(&state, bound, &game_id, "u4").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn blank_user_id_is_unauthorized() {
        let state = state_with(SessionPolicy::default());
        let conn = connect(&state).await;
        let game_id = new_game(&state).await;

        let err = join_game(&state, conn, &game_id, "  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(players_of(&state, &game_id).await.is_empty());
    }

    #[tokio::test]
    async fn leave_requires_bound_user() {
        let state = state_with(SessionPolicy::default());
        let conn = connect(&state).await;
        let game_id = new_game(&state).await;

        let err = leave_game(&state, conn, &game_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn status_changes_follow_lifecycle() {
        let state = state_with(SessionPolicy::default());
        let game_id = new_game(&state).await;

        let dispatches = start_game(&state, &game_id).await.unwrap();
        let ServerMessage::GameStatusChanged(change) = &dispatches[0].message else {
            panic!("expected game_status_changed");
        };
        assert_eq!(change.status, GameStatus::InProgress);

        finish_game(&state, &game_id).await.unwrap();
        let err = finish_game(&state, &game_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = start_game(&state, &game_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn malformed_game_id_is_not_found() {
        let state = state_with(SessionPolicy::default());
        let conn = connect(&state).await;

        let err = join_game(&state, conn, "not-a-game", "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = delete_game(&state, "not-a-game").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn game_limit_is_reported_as_unavailable() {
        let state = state_with(SessionPolicy {
            max_games: Some(1),
            ..SessionPolicy::default()
        });
        create_game(&state).await.unwrap();

        let err = create_game(&state).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn restored_games_start_with_disconnected_players() {
        let state = state_with(SessionPolicy::default());
        let mut game = Game::new();
        game.players.push(crate::state::game::Player::new(
            UserId::from("u1"),
            Uuid::new_v4(),
        ));
        let game_id = game.id;
        let entity = GameEntity::from(&game);

        let dispatches = restore_games(&state, vec![entity.clone()]).await;
        assert_eq!(dispatches.len(), 1);
        assert!(restore_games(&state, vec![entity]).await.is_empty());

        assert_eq!(
            players_of(&state, &game_id.to_string()).await,
            vec![("u1".to_string(), false)]
        );
        let games = state.presence().read().await.games_of(&UserId::from("u1"));
        assert_eq!(games, vec![game_id]);

        let conn = connect(&state).await;
        join_game(&state, conn, &game_id.to_string(), "u1").await.unwrap();
        assert_eq!(
            players_of(&state, &game_id.to_string()).await,
            vec![("u1".to_string(), true)]
        );
    }

    fn seated_entity(user: &str) -> GameEntity {
        let mut game = Game::new();
        game.players
            .push(crate::state::game::Player::new(UserId::from(user), Uuid::new_v4()));
        GameEntity::from(&game)
    }

    #[tokio::test]
    async fn deleted_games_are_not_restored_from_stale_snapshots() {
        let state = state_with(SessionPolicy::default());
        let game_id = new_game(&state).await;
        let id = Uuid::parse_str(&game_id).unwrap();
        let snapshot = GameEntity::from(state.registry().read().await.get_game(id).unwrap());

        delete_game(&state, &game_id).await.unwrap();

        assert!(restore_games(&state, vec![snapshot]).await.is_empty());
        assert!(state.registry().read().await.is_empty());
    }

    #[tokio::test]
    async fn restored_game_without_seats_is_deleted_when_empty_games_are_dropped() {
        let state = state_with(SessionPolicy {
            delete_empty_games: true,
            ..instant_removal()
        });
        let mut queue = state.take_persist_queue().await.unwrap();
        let entity = seated_entity("u1");
        let game_id = entity.id;

        let dispatches = restore_games(&state, vec![entity.clone()]).await;

        assert!(dispatches.is_empty());
        assert!(state.registry().read().await.is_empty());
        assert_eq!(queue.try_recv().unwrap(), StoreChange::Delete(game_id));
        assert!(restore_games(&state, vec![entity]).await.is_empty());
        assert!(state.registry().read().await.is_empty());
    }

    #[tokio::test]
    async fn restored_game_keeps_its_slot_when_empty_games_are_kept() {
        let state = state_with(instant_removal());
        let entity = seated_entity("u1");
        let game_id = entity.id;

        let dispatches = restore_games(&state, vec![entity]).await;

        assert_eq!(dispatches.len(), 1);
        assert!(players_of(&state, &game_id.to_string()).await.is_empty());
        assert!(state.presence().read().await.games_of(&UserId::from("u1")).is_empty());
    }

    #[tokio::test]
    async fn user_ids_are_trimmed_before_use() {
        let state = state_with(SessionPolicy::default());
        let (a, b) = (connect(&state).await, connect(&state).await);
        let game_id = new_game(&state).await;

        join_game(&state, a, &game_id, " u1 ").await.unwrap();
        assert_eq!(players_of(&state, &game_id).await, vec![("u1".to_string(), true)]);

        let err = join_game(&state, b, &game_id, "u1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyMember);

        remove_player(&state, b, &game_id, "u1 ").await.unwrap();
        assert!(players_of(&state, &game_id).await.is_empty());
    }
}
