// =============================================================================
// FitPulse Social Fitness Backend - Gateway Plumbing
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Shared connection handling for both gateway namespaces: handshake
//   authentication (Authorization header wins over the ?token= query
//   fallback), the outbound writer task, and bus fan-out helpers. A failed
//   handshake closes the connection before any session state exists; there
//   is no anonymous session.
//
// =============================================================================

pub mod direct;
pub mod events;
pub mod room;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures_util::{stream::SplitSink, SinkExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::service::auth::AuthenticatedUser;
use crate::service::bus::Envelope;
use crate::{services, Error, Result};

/// Depth of the per-connection outbound queue.
const OUTBOUND_QUEUE: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsAuthParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// Resolve the bearer credential from the handshake. The Authorization
/// header takes precedence over the query-string fallback used by browser
/// WebSocket clients that cannot set headers.
pub async fn authenticate_handshake(
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<AuthenticatedUser> {
    let header_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let token = header_token
        .or(query_token)
        .ok_or_else(|| Error::Authentication("missing bearer credential".to_owned()))?;
    services().auth.validate(token).await
}

/// # `GET /ws/chat`
///
/// Upgrade into the room chat namespace.
pub async fn chat_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<WsAuthParams>,
    headers: HeaderMap,
) -> Response {
    match authenticate_handshake(&headers, params.token.as_deref()).await {
        Ok(user) => ws.on_upgrade(move |socket| room::handle_connection(socket, user)),
        Err(e) => {
            debug!(error = %e, "chat handshake rejected");
            e.into_response()
        }
    }
}

/// # `GET /ws/direct`
///
/// Upgrade into the one-to-one chat namespace.
pub async fn direct_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<WsAuthParams>,
    headers: HeaderMap,
) -> Response {
    match authenticate_handshake(&headers, params.token.as_deref()).await {
        Ok(user) => ws.on_upgrade(move |socket| direct::handle_connection(socket, user)),
        Err(e) => {
            debug!(error = %e, "direct handshake rejected");
            e.into_response()
        }
    }
}

pub(crate) fn outbound_channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(OUTBOUND_QUEUE)
}

/// Drain the outbound queue onto the socket until either side closes.
pub(crate) async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<String>,
) {
    while let Some(text) = rx.recv().await {
        if sink.send(WsMessage::Text(text)).await.is_err() {
            break;
        }
    }
}

/// Serialize a typed server event to the originating connection only.
pub(crate) async fn send_event<T: Serialize>(tx: &mpsc::Sender<String>, event: &T) {
    match serde_json::to_string(event) {
        Ok(text) => {
            let _ = tx.send(text).await;
        }
        Err(e) => error!(error = %e, "unserializable server event dropped"),
    }
}

/// Forward a bus envelope to a connection as a wire frame.
pub(crate) async fn send_envelope(tx: &mpsc::Sender<String>, envelope: &Envelope) {
    let frame = serde_json::json!({
        "event": envelope.event,
        "data": envelope.payload,
    });
    let _ = tx.send(frame.to_string()).await;
}

/// Fan a typed server event out to a room via the bus. Delivery degrades to
/// local-only when the bus is unavailable.
pub(crate) async fn broadcast<T: Serialize>(
    channel: &str,
    room: &str,
    event: &T,
    exclude: Option<Uuid>,
) {
    let frame = match serde_json::to_value(event) {
        Ok(frame) => frame,
        Err(e) => {
            error!(error = %e, "unserializable broadcast event dropped");
            return;
        }
    };
    let Some(name) = frame.get("event").and_then(|v| v.as_str()) else {
        error!("broadcast event is missing its name tag");
        return;
    };
    let envelope = Envelope {
        room: room.to_owned(),
        event: name.to_owned(),
        payload: frame.get("data").cloned().unwrap_or(serde_json::Value::Null),
        exclude,
    };
    services().bus.publish(channel, envelope).await;
}
