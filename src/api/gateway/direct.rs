// =============================================================================
// FitPulse Social Fitness Backend - Direct Chat Gateway
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   One-to-one chat protocol. Conversations resolve through the normalized
//   user pair, so both parties always land in the same two-party room.
//   When the receiver has the conversation open the message is receipted
//   synchronously at send time and broadcast with isRead already true,
//   saving the separate mark-as-read round trip for the common
//   both-parties-active case.
//
// =============================================================================

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{DirectClientEvent, DirectServerEvent};
use super::{broadcast, outbound_channel, send_envelope, send_event, write_loop};
use crate::service::auth::AuthenticatedUser;
use crate::service::bus;
use crate::service::direct::Conversation;
use crate::service::messages::{direct_container, MessageKind};
use crate::utils::preview;
use crate::{services, Error, Result};

const PUSH_PREVIEW_CHARS: usize = 80;
const LIST_PREVIEW_CHARS: usize = 120;

pub async fn handle_connection(socket: WebSocket, user: AuthenticatedUser) {
    let connection_id = Uuid::new_v4();
    let svc = services();
    svc.direct.register_socket(user.user_id, connection_id).await;
    debug!(user_id = user.user_id, %connection_id, "direct connection opened");

    let (sink, mut stream) = socket.split();
    let (tx, rx) = outbound_channel();
    let writer = tokio::spawn(write_loop(sink, rx));

    // rooms this socket has joined; bus envelopes are filtered against it
    let mut joined: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut direct_rx = svc.bus.subscribe(bus::DIRECT_CHANNEL);

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    match handle_event(&text, connection_id, &user, &tx).await {
                        Ok(Some(RoomChange::Joined(room))) => { joined.insert(room); }
                        Ok(Some(RoomChange::Left(room))) => { joined.remove(&room); }
                        Ok(None) => {}
                        Err(e) => {
                            debug!(user_id = user.user_id, error = %e, "direct event failed");
                            send_event(&tx, &DirectServerEvent::Error(e.to_wire())).await;
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            envelope = direct_rx.recv() => match envelope {
                Ok(envelope) => {
                    if envelope.exclude != Some(connection_id) && joined.contains(&envelope.room) {
                        send_envelope(&tx, &envelope).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = user.user_id, skipped, "direct fan-out lagging");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(open) = svc
        .direct
        .unregister_socket(user.user_id, connection_id)
        .await
    {
        // last socket gone: peers watching any open conversation see the
        // user drop offline
        for conversation_id in open {
            broadcast(
                bus::DIRECT_CHANNEL,
                &direct_container(conversation_id),
                &DirectServerEvent::UserOffline {
                    user_id: user.user_id,
                },
                None,
            )
            .await;
        }
    }
    writer.abort();
    debug!(user_id = user.user_id, %connection_id, "direct connection closed");
}

/// Outcome of a handler that changes which two-party room this socket is in.
enum RoomChange {
    Joined(String),
    Left(String),
}

async fn handle_event(
    text: &str,
    connection_id: Uuid,
    user: &AuthenticatedUser,
    tx: &mpsc::Sender<String>,
) -> Result<Option<RoomChange>> {
    let event: DirectClientEvent = serde_json::from_str(text)
        .map_err(|e| Error::Validation(format!("unrecognized event: {e}")))?;
    match event {
        DirectClientEvent::JoinPrivateRoom { receiver_id } => {
            join_private_room(receiver_id, connection_id, user, tx).await
        }
        DirectClientEvent::SendPrivateMessage {
            conversation_id,
            message,
            message_type,
            attachment_url,
        } => {
            send_private_message(conversation_id, &message, message_type, attachment_url, user)
                .await?;
            Ok(None)
        }
        DirectClientEvent::DeletePrivateMessage { message_id } => {
            match services()
                .messages
                .soft_delete(message_id, user.user_id)
                .await?
            {
                Some(message) => {
                    broadcast(
                        bus::DIRECT_CHANNEL,
                        &message.container,
                        &DirectServerEvent::PrivateMessageDeleted { message_id },
                        None,
                    )
                    .await;
                    Ok(None)
                }
                None => Err(Error::Authorization(
                    "only the sender can delete a message".to_owned(),
                )),
            }
        }
        DirectClientEvent::PrivateTyping {
            conversation_id,
            is_typing,
        } => {
            let conversation = require_party(conversation_id, user.user_id).await?;
            broadcast(
                bus::DIRECT_CHANNEL,
                &conversation.container(),
                &DirectServerEvent::UserPrivateTyping {
                    conversation_id,
                    user_id: user.user_id,
                    is_typing,
                },
                Some(connection_id),
            )
            .await;
            Ok(None)
        }
        DirectClientEvent::MarkPrivateMessagesAsRead { conversation_id } => {
            let conversation = require_party(conversation_id, user.user_id).await?;
            let message_ids = services()
                .messages
                .mark_all_read(&conversation.container(), user.user_id)
                .await?;
            broadcast(
                bus::DIRECT_CHANNEL,
                &conversation.container(),
                &DirectServerEvent::MessagesMarkedAsRead {
                    conversation_id,
                    reader_id: user.user_id,
                    message_ids,
                },
                None,
            )
            .await;
            Ok(None)
        }
        DirectClientEvent::LeavePrivateRoom { conversation_id } => {
            services()
                .direct
                .mark_closed(user.user_id, conversation_id)
                .await;
            Ok(Some(RoomChange::Left(direct_container(conversation_id))))
        }
    }
}

async fn join_private_room(
    receiver_id: i64,
    connection_id: Uuid,
    user: &AuthenticatedUser,
    tx: &mpsc::Sender<String>,
) -> Result<Option<RoomChange>> {
    let svc = services();
    let conversation = svc.direct.open_conversation(user.user_id, receiver_id).await?;
    svc.direct.mark_open(user.user_id, conversation.id).await;

    let room = conversation.container();
    let history = svc.messages.history(&room, None, None, None).await?;
    let peer_online = svc.direct.is_online(conversation.peer_of(user.user_id)).await;
    send_event(
        tx,
        &DirectServerEvent::JoinedPrivateRoom {
            conversation: conversation.clone(),
            history,
            peer_online,
        },
    )
    .await;

    broadcast(
        bus::DIRECT_CHANNEL,
        &room,
        &DirectServerEvent::UserOnline {
            user_id: user.user_id,
        },
        Some(connection_id),
    )
    .await;
    Ok(Some(RoomChange::Joined(room)))
}

async fn send_private_message(
    conversation_id: Uuid,
    body: &str,
    message_type: Option<MessageKind>,
    attachment_url: Option<String>,
    user: &AuthenticatedUser,
) -> Result<()> {
    let svc = services();
    let conversation = require_party(conversation_id, user.user_id).await?;
    let receiver_id = conversation.peer_of(user.user_id);
    let room = conversation.container();

    let mut message = svc
        .messages
        .append(user.user_id, &room, body, message_type, attachment_url)
        .await?;

    // peer looking at this conversation right now -> receipt synchronously
    // and broadcast with the flag already set
    let receiver_watching = svc.direct.has_open(receiver_id, conversation_id).await;
    if receiver_watching {
        svc.messages.mark_read(message.message.id, receiver_id).await?;
    }
    message.is_read = Some(receiver_watching);

    svc.direct
        .touch(
            conversation_id,
            &preview(&message.message.body, LIST_PREVIEW_CHARS),
            message.message.created_at,
            receiver_id,
        )
        .await?;

    let push_body = preview(&message.message.body, PUSH_PREVIEW_CHARS);
    broadcast(
        bus::DIRECT_CHANNEL,
        &room,
        &DirectServerEvent::NewPrivateMessage(message),
        None,
    )
    .await;

    if !svc.direct.is_online(receiver_id).await {
        svc.pusher
            .dispatch(vec![receiver_id], user.nickname.clone(), push_body);
    }
    Ok(())
}

async fn require_party(conversation_id: Uuid, user_id: i64) -> Result<Conversation> {
    services()
        .direct
        .require_party(conversation_id, user_id)
        .await
}
