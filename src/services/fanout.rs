use tracing::{debug, warn};

use crate::{
    dto::{sse::ServerEvent, ws::ServerMessage},
    services::{
        session_service::{Audience, Dispatch},
        websocket_service::send_message_to_websocket,
    },
    state::{SharedState, game::ConnectionId},
};

/// Deliver coordinator output to the addressed sockets.
///
/// A closed writer drops the connection from the routing table; delivery to
/// the remaining recipients continues.
pub fn deliver(state: &SharedState, dispatches: Vec<Dispatch>) {
    for Dispatch { audience, message } in dispatches {
        let targets: Vec<ConnectionId> = match audience {
            Audience::Connection(connection) => vec![connection],
            Audience::Connections(connections) => connections,
            Audience::Everyone => {
                mirror_to_sse(state, &message);
                state.connections().iter().map(|entry| *entry.key()).collect()
            }
        };

        for connection in targets {
            send_to(state, connection, &message);
        }
    }
}

/// Push one message to one connection, forgetting it when its writer is gone.
pub fn send_to(state: &SharedState, connection: ConnectionId, message: &ServerMessage) {
    let Some(tx) = state
        .connections()
        .get(&connection)
        .map(|entry| entry.tx.clone())
    else {
        debug!(connection = %connection, event = message.name(), "recipient no longer connected");
        return;
    };

    if send_message_to_websocket(&tx, message).is_err() {
        warn!(
            connection = %connection,
            event = message.name(),
            "send failed (writer closed), removing connection"
        );
        state.connections().remove(&connection);
    }
}

/// Lobby-wide events are also published on the lobby SSE stream.
fn mirror_to_sse(state: &SharedState, message: &ServerMessage) {
    let event = match message {
        ServerMessage::GameCreated(game) => ServerEvent::json(message.name().to_string(), game),
        ServerMessage::GameDeleted(game_id) => {
            ServerEvent::json(message.name().to_string(), game_id)
        }
        ServerMessage::GameStatusChanged(change) => {
            ServerEvent::json(message.name().to_string(), change)
        }
        _ => return,
    };

    match event {
        Ok(event) => {
            let delivered = state.lobby_feed().publish(event);
            debug!(event = message.name(), delivered, "mirrored lobby event to SSE");
        }
        Err(err) => warn!(error = %err, event = message.name(), "failed to serialise SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, ClientConnection},
    };

    fn attach(state: &SharedState) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        state.connections().insert(id, ClientConnection { id, tx });
        (id, rx)
    }

    fn text(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn everyone_reaches_all_sockets_and_sse() {
        let state = AppState::new(AppConfig::default());
        let (_, mut first) = attach(&state);
        let (_, mut second) = attach(&state);
        let mut sse = state.lobby_feed().subscribe();
        let game_id = Uuid::new_v4();

        deliver(
            &state,
            vec![Dispatch::everyone(ServerMessage::GameDeleted(game_id))],
        );

        for rx in [&mut first, &mut second] {
            let value = text(rx.try_recv().unwrap());
            assert_eq!(value["event"], "game_deleted");
            assert_eq!(value["data"], game_id.to_string());
        }
        let event = sse.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some("game_deleted"));
    }

    #[tokio::test]
    async fn closed_writer_is_dropped_and_others_still_served() {
        let state = AppState::new(AppConfig::default());
        let (gone, gone_rx) = attach(&state);
        let (alive, mut alive_rx) = attach(&state);
        drop(gone_rx);

        deliver(
            &state,
            vec![
                Dispatch::members(vec![gone, alive], ServerMessage::GamesList(Vec::new()))
                    .unwrap(),
            ],
        );

        assert!(state.connections().get(&gone).is_none());
        assert!(state.connections().get(&alive).is_some());
        assert_eq!(text(alive_rx.try_recv().unwrap())["event"], "games_list");
    }
}
