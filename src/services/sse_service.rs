use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::warn;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    state::SharedState,
};

const KEEP_ALIVE: Duration = Duration::from_secs(15);
const LOBBY_STREAM: &str = "lobby";

/// Subscribe to the lobby stream and build the handshake for the new client.
pub async fn subscribe_lobby(
    state: &SharedState,
) -> (broadcast::Receiver<ServerEvent>, Option<ServerEvent>) {
    let receiver = state.lobby_feed().subscribe();
    let handshake = Handshake {
        stream: LOBBY_STREAM.to_string(),
        games: state.registry().read().await.len(),
        degraded: state.is_degraded(),
    };

    let event = match ServerEvent::json(Some("handshake".to_string()), &handshake) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to serialise SSE handshake");
            None
        }
    };
    (receiver, event)
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Turn a lobby subscription into an SSE response, `first` ahead of any broadcast.
///
/// A lagging subscriber skips the events it missed.
pub fn to_sse_stream(
    receiver: broadcast::Receiver<ServerEvent>,
    first: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(payload) => Some(payload),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "lobby SSE subscriber lagged");
            None
        }
    });

    let events = tokio_stream::iter(first)
        .chain(updates)
        .map(|payload| Ok(to_event(payload)));

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE).text("keep-alive"))
}
