//! Wire shapes of the lobby: WebSocket frames, REST bodies, SSE payloads.

use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod game;
pub mod health;
pub mod sse;
pub mod validation;
pub mod ws;

/// RFC 3339 timestamp in UTC, as sent to clients.
fn rfc3339(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
