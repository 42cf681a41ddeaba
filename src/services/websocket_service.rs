use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ErrorPayload, ServerMessage},
    error::ServiceError,
    services::{fanout, session_service},
    state::{ClientConnection, SharedState, game::ConnectionId},
};

/// Failures local to the WebSocket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket writer is gone; the connection is over.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Handle the full lifecycle of one lobby WebSocket connection.
///
/// `user_id` comes from the optional `?userId=` query and binds the connection
/// before the first frame.
pub async fn handle_socket(state: SharedState, socket: WebSocket, user_id: Option<String>) {
    let connection = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Sole owner of the socket sink.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    if let Err(err) =
        session_service::register_connection(&state, connection, user_id.as_deref()).await
    {
        warn!(connection = %connection, error = %err, "rejecting connection");
        let _ = send_error(&outbound_tx, &err);
        let _ = outbound_tx.send(Message::Close(None));
        // The connection may already be tracked when only the user binding failed.
        session_service::disconnect(&state, connection).await;
        finalize(writer_task, outbound_tx).await;
        return;
    }

    state.connections().insert(
        connection,
        ClientConnection {
            id: connection,
            tx: outbound_tx.clone(),
        },
    );
    info!(connection = %connection, user_id = ?user_id, "lobby client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if handle_text(&state, connection, &outbound_tx, text.as_str())
                    .await
                    .is_err()
                {
                    info!(connection = %connection, "connection closed while replying, terminating");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                let err = ServiceError::InvalidInput("binary frames are not supported".into());
                if send_error(&outbound_tx, &err).is_err() {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                info!(connection = %connection, "lobby client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Err(err) => {
                warn!(connection = %connection, error = %err, "websocket error");
                break;
            }
        }
    }

    state.connections().remove(&connection);
    let dispatches = session_service::disconnect(&state, connection).await;
    fanout::deliver(&state, dispatches);
    info!(connection = %connection, "lobby client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Parse, run and answer one text frame. Errors only reach the sender.
async fn handle_text(
    state: &SharedState,
    connection: ConnectionId,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) -> Result<(), TransportError> {
    let result = match ClientMessage::from_json_str(text) {
        Ok(message) => {
            let event = message.name();
            info!(connection = %connection, event, "received lobby event");
            session_service::handle_message(state, connection, message)
                .await
                .inspect_err(|err| {
                    warn!(connection = %connection, event, error = %err, "lobby event rejected")
                })
        }
        Err(err) => {
            warn!(connection = %connection, error = %err, "failed to parse or validate lobby message");
            Err(err)
        }
    };

    match result {
        Ok(dispatches) => {
            fanout::deliver(state, dispatches);
            Ok(())
        }
        Err(err) => send_error(outbound_tx, &err),
    }
}

fn send_error(
    tx: &mpsc::UnboundedSender<Message>,
    err: &ServiceError,
) -> Result<(), TransportError> {
    send_message_to_websocket(tx, &ServerMessage::Error(ErrorPayload::from(err)))
}

/// Queue `value` as a JSON text frame on a connection's writer.
///
/// A value that fails to serialize is logged and dropped. Only a closed writer is an error.
pub fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), TransportError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "dropping unserializable lobby message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| TransportError::ConnectionClosed)
}

/// Close the outbound channel and wait for the writer to flush.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
