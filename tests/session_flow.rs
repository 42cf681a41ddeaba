use axum::extract::ws::Message;
use bingo_lobby_back::{
    client::LobbyView,
    config::{AppConfig, SessionPolicy},
    dto::ws::{ClientMessage, ServerMessage},
    error::ErrorKind,
    services::{fanout, session_service},
    state::{AppState, ClientConnection, SharedState, game::ConnectionId},
};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Client {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Message>,
    view: LobbyView,
}

impl Client {
    async fn connect(state: &SharedState) -> Self {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        session_service::register_connection(state, id, None)
            .await
            .unwrap();
        state.connections().insert(id, ClientConnection { id, tx });
        Self {
            id,
            rx,
            view: LobbyView::new(),
        }
    }

    async fn send(&self, state: &SharedState, frame: &str) {
        let result = match ClientMessage::from_json_str(frame) {
            Ok(message) => session_service::handle_message(state, self.id, message).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(dispatches) => fanout::deliver(state, dispatches),
            Err(err) => fanout::send_to(state, self.id, &ServerMessage::Error((&err).into())),
        }
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut received = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            let Message::Text(text) = frame else { continue };
            let message: ServerMessage = serde_json::from_str(text.as_str()).unwrap();
            self.view.apply(&message);
            received.push(message);
        }
        received
    }
}

fn error_kind(messages: &[ServerMessage]) -> Option<ErrorKind> {
    messages.iter().find_map(|message| match message {
        ServerMessage::Error(payload) => Some(payload.kind),
        _ => None,
    })
}

#[tokio::test]
async fn lobby_round_trip_over_the_wire_format() {
    let state = AppState::new(AppConfig::default());
    let mut alice = Client::connect(&state).await;
    let mut bob = Client::connect(&state).await;

    alice.send(&state, r#"{"event":"create_game"}"#).await;
    let created = alice.drain();
    assert_eq!(created.len(), 1);
    assert_eq!(bob.drain().len(), 1);
    let game_id = alice.view.games()[0].id;
    assert_eq!(bob.view.games()[0].id, game_id);

    let join = format!(r#"{{"event":"join_game","data":{{"gameId":"{game_id}","userId":"u1"}}}}"#);
    alice.send(&state, &join).await;
    let joined = alice.drain();
    assert!(matches!(joined.as_slice(), [ServerMessage::GameJoined(_)]));
    assert_eq!(alice.view.current_game().unwrap().players.len(), 1);

    alice.send(&state, &join).await;
    assert_eq!(error_kind(&alice.drain()), Some(ErrorKind::AlreadyMember));
    assert!(bob.drain().is_empty());

    let remove = format!(r#"{{"event":"remove_player","data":{{"gameId":"{game_id}","userId":"u1"}}}}"#);
    alice.send(&state, &remove).await;
    assert!(matches!(
        alice.drain().as_slice(),
        [ServerMessage::PlayerRemoved(_)]
    ));
    assert!(alice.view.current_game().unwrap().players.is_empty());

    let delete = format!(r#"{{"event":"delete_game","data":{{"gameId":"{game_id}"}}}}"#);
    alice.send(&state, &delete).await;
    alice.drain();
    bob.drain();
    assert!(alice.view.games().is_empty());
    assert!(alice.view.current_game().is_none());
    assert!(bob.view.games().is_empty());

    alice.send(&state, &join).await;
    assert_eq!(error_kind(&alice.drain()), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn malformed_frames_only_answer_the_sender() {
    let state = AppState::new(AppConfig::default());
    let mut alice = Client::connect(&state).await;
    let mut bob = Client::connect(&state).await;

    alice.send(&state, r#"{"event":"launch_rockets"}"#).await;

    assert_eq!(error_kind(&alice.drain()), Some(ErrorKind::InvalidInput));
    assert!(bob.drain().is_empty());
    assert!(state.connections().get(&alice.id).is_some());
}

#[tokio::test]
async fn members_see_disconnects_and_rejoins() {
    let state = AppState::new(AppConfig::default());
    let mut alice = Client::connect(&state).await;
    let mut bob = Client::connect(&state).await;

    alice.send(&state, r#"{"event":"create_game"}"#).await;
    alice.drain();
    let game_id = alice.view.games()[0].id;
    for (client, user) in [(&alice, "u1"), (&bob, "u2")] {
        let join = format!(r#"{{"event":"join_game","data":{{"gameId":"{game_id}","userId":"{user}"}}}}"#);
        client.send(&state, &join).await;
    }
    alice.drain();
    bob.drain();

    state.connections().remove(&alice.id);
    let dispatches = session_service::disconnect(&state, alice.id).await;
    fanout::deliver(&state, dispatches);
    assert_eq!(
        bob.drain(),
        vec![ServerMessage::PlayerDisconnected("u1".into())]
    );
    assert!(!bob.view.current_game().unwrap().players[0].connected);

    let mut again = Client::connect(&state).await;
    let join = format!(r#"{{"event":"join_game","data":{{"gameId":"{game_id}","userId":"u1"}}}}"#);
    again.send(&state, &join).await;
    assert!(matches!(again.drain().as_slice(), [ServerMessage::GameJoined(_)]));
    assert_eq!(
        bob.drain(),
        vec![ServerMessage::PlayerReconnected("u1".into())]
    );
    assert!(bob.view.current_game().unwrap().players[0].connected);
}

#[tokio::test]
async fn instant_removal_policy_frees_the_seat() {
    let state = AppState::new(AppConfig {
        session: SessionPolicy {
            disconnect_grace: std::time::Duration::ZERO,
            ..SessionPolicy::default()
        },
        ..AppConfig::default()
    });
    let mut alice = Client::connect(&state).await;
    let mut bob = Client::connect(&state).await;
    alice.send(&state, r#"{"event":"create_game"}"#).await;
    alice.drain();
    bob.drain();
    let game_id = alice.view.games()[0].id;
    for (client, user) in [(&alice, "u1"), (&bob, "u2")] {
        let join = format!(r#"{{"event":"join_game","data":{{"gameId":"{game_id}","userId":"{user}"}}}}"#);
        client.send(&state, &join).await;
    }
    bob.drain();

    let dispatches = session_service::disconnect(&state, alice.id).await;
    fanout::deliver(&state, dispatches);
    assert_eq!(
        bob.drain(),
        vec![ServerMessage::PlayerDisconnected("u1".into())]
    );
    assert!(session_service::disconnect(&state, alice.id).await.is_empty());

    let registry = state.registry().read().await;
    let players = &registry.get_game(game_id).unwrap().players;
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].user_id.as_str(), "u2");
}
