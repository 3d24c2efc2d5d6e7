// =============================================================================
// FitPulse Social Fitness Backend - Room Chat Gateway
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Per-connection protocol for challenge-room chat. Joining requires an
//   admitted participant record; history and the online list go to the
//   caller only, everything else fans out room-wide over the bus. Any
//   handler failure is converted to a structured error on the originating
//   connection; the connection itself survives.
//
// =============================================================================

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{RoomClientEvent, RoomServerEvent};
use super::{broadcast, outbound_channel, send_envelope, send_event, write_loop};
use crate::service::auth::AuthenticatedUser;
use crate::service::bus::{self, Envelope};
use crate::service::messages::{parse_room_container, room_container, MessageKind};
use crate::utils::preview;
use crate::{services, Error, Result};

const PUSH_PREVIEW_CHARS: usize = 80;

pub async fn handle_connection(socket: WebSocket, user: AuthenticatedUser) {
    let connection_id = Uuid::new_v4();
    let svc = services();
    svc.presence.on_connect(connection_id, user.user_id).await;
    debug!(user_id = user.user_id, %connection_id, "chat connection opened");

    let (sink, mut stream) = socket.split();
    let (tx, rx) = outbound_channel();
    let writer = tokio::spawn(write_loop(sink, rx));

    let mut chat_rx = svc.bus.subscribe(bus::CHAT_CHANNEL);
    let mut entry_rx = svc.bus.subscribe(bus::ENTRY_CHANNEL);

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Err(e) = handle_event(&text, connection_id, &user, &tx).await {
                        debug!(user_id = user.user_id, error = %e, "chat event failed");
                        send_event(&tx, &RoomServerEvent::Error(e.to_wire())).await;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {} // ping/pong/binary handled by the transport
            },
            envelope = chat_rx.recv() => match envelope {
                Ok(envelope) => forward(&tx, connection_id, envelope).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = user.user_id, skipped, "chat fan-out lagging");
                }
                Err(RecvError::Closed) => break,
            },
            envelope = entry_rx.recv() => match envelope {
                Ok(envelope) => forward(&tx, connection_id, envelope).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = user.user_id, skipped, "entry fan-out lagging");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    // leave events fire before the connection leaves the presence index
    let mut joined: Vec<String> = svc.presence.rooms_of(connection_id).await.into_iter().collect();
    joined.sort();
    for room in &joined {
        if let Some(room_id) = parse_room_container(room) {
            broadcast(
                bus::CHAT_CHANNEL,
                room,
                &RoomServerEvent::UserLeft {
                    room_id,
                    user_id: user.user_id,
                },
                None,
            )
            .await;
        }
    }
    svc.presence.on_disconnect(connection_id).await;
    writer.abort();
    debug!(user_id = user.user_id, %connection_id, "chat connection closed");
}

/// Deliver a bus envelope to this connection if it belongs to the room and
/// is not the excluded originator.
async fn forward(tx: &mpsc::Sender<String>, connection_id: Uuid, envelope: Envelope) {
    if envelope.exclude == Some(connection_id) {
        return;
    }
    if services()
        .presence
        .is_joined(connection_id, &envelope.room)
        .await
    {
        send_envelope(tx, &envelope).await;
    }
}

async fn handle_event(
    text: &str,
    connection_id: Uuid,
    user: &AuthenticatedUser,
    tx: &mpsc::Sender<String>,
) -> Result<()> {
    let event: RoomClientEvent = serde_json::from_str(text)
        .map_err(|e| Error::Validation(format!("unrecognized event: {e}")))?;
    match event {
        RoomClientEvent::JoinRoom { room_id } => join_room(room_id, connection_id, user, tx).await,
        RoomClientEvent::SendMessage {
            room_id,
            message,
            message_type,
            attachment_url,
        } => {
            send_message(
                room_id,
                &message,
                message_type,
                attachment_url,
                connection_id,
                user,
            )
            .await
        }
        RoomClientEvent::LoadMoreMessages {
            room_id,
            page,
            limit,
            before_timestamp,
        } => {
            let room = room_container(room_id);
            let history = services()
                .messages
                .history(&room, page, limit, before_timestamp)
                .await?;
            send_event(tx, &RoomServerEvent::MoreMessages(history)).await;
            Ok(())
        }
        RoomClientEvent::DeleteMessage { message_id } => {
            delete_message(message_id, user).await
        }
        RoomClientEvent::Typing { room_id, is_typing } => {
            let room = room_container(room_id);
            broadcast(
                bus::CHAT_CHANNEL,
                &room,
                &RoomServerEvent::UserTyping {
                    room_id,
                    user_id: user.user_id,
                    is_typing,
                },
                Some(connection_id),
            )
            .await;
            Ok(())
        }
        RoomClientEvent::LeaveRoom { room_id } => {
            let room = room_container(room_id);
            services().presence.leave_room(connection_id, &room).await;
            broadcast(
                bus::CHAT_CHANNEL,
                &room,
                &RoomServerEvent::UserLeft {
                    room_id,
                    user_id: user.user_id,
                },
                None,
            )
            .await;
            Ok(())
        }
    }
}

async fn join_room(
    room_id: i64,
    connection_id: Uuid,
    user: &AuthenticatedUser,
    tx: &mpsc::Sender<String>,
) -> Result<()> {
    let svc = services();
    if !svc.participation.is_admitted(room_id, user.user_id).await? {
        return Err(Error::Authorization(
            "not a participant of this challenge".to_owned(),
        ));
    }

    let room = room_container(room_id);
    svc.presence.join_room(connection_id, &room).await;

    // history and the online list go to the joining caller only
    let history = svc.messages.history(&room, None, None, None).await?;
    send_event(tx, &RoomServerEvent::ChatHistory(history)).await;
    let users = svc.presence.online_users_in(&room).await;
    send_event(tx, &RoomServerEvent::OnlineUsers { room_id, users }).await;

    broadcast(
        bus::CHAT_CHANNEL,
        &room,
        &RoomServerEvent::UserJoined {
            room_id,
            user_id: user.user_id,
            nickname: user.nickname.clone(),
        },
        None,
    )
    .await;
    Ok(())
}

async fn send_message(
    room_id: i64,
    body: &str,
    message_type: Option<MessageKind>,
    attachment_url: Option<String>,
    connection_id: Uuid,
    user: &AuthenticatedUser,
) -> Result<()> {
    let svc = services();
    let room = room_container(room_id);
    if !svc.presence.is_joined(connection_id, &room).await {
        return Err(Error::Authorization(
            "join the room before sending".to_owned(),
        ));
    }

    let message = svc
        .messages
        .append(user.user_id, &room, body, message_type, attachment_url)
        .await?;
    let push_body = preview(&message.message.body, PUSH_PREVIEW_CHARS);
    broadcast(
        bus::CHAT_CHANNEL,
        &room,
        &RoomServerEvent::NewMessage(message),
        None,
    )
    .await;

    // best-effort push for participants without an open connection;
    // failures are logged, never surfaced to the sender
    match svc.participation.participants_of(room_id).await {
        Ok(roster) => {
            let mut absent = Vec::new();
            for entry in roster {
                let participant_id = entry.participant.user_id;
                if participant_id != user.user_id && !svc.presence.is_online(participant_id).await {
                    absent.push(participant_id);
                }
            }
            svc.pusher.dispatch(absent, user.nickname.clone(), push_body);
        }
        Err(e) => warn!(room_id, error = %e, "skipping push fan-out, roster unavailable"),
    }
    Ok(())
}

async fn delete_message(message_id: Uuid, user: &AuthenticatedUser) -> Result<()> {
    match services()
        .messages
        .soft_delete(message_id, user.user_id)
        .await?
    {
        Some(message) => {
            // only the id travels; the content stays soft-deleted in place
            broadcast(
                bus::CHAT_CHANNEL,
                &message.container,
                &RoomServerEvent::MessageDeleted { message_id },
                None,
            )
            .await;
            Ok(())
        }
        None => Err(Error::Authorization(
            "only the sender can delete a message".to_owned(),
        )),
    }
}
