// =============================================================================
// FitPulse Social Fitness Backend - Gateway Wire Events
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Closed event vocabulary for both gateway namespaces. Every frame is
//   {"event": <name>, "data": <payload>}; inbound frames are validated into
//   these unions at the boundary before any handler runs, so handlers never
//   see duck-typed payloads.
//
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::service::direct::Conversation;
use crate::service::messages::{MessageKind, MessagePage, OutboundMessage};
use crate::utils::error::ErrorPayload;

// ---- room chat namespace --------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RoomClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: i64 },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        room_id: i64,
        message: String,
        #[serde(default)]
        message_type: Option<MessageKind>,
        #[serde(default)]
        attachment_url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LoadMoreMessages {
        room_id: i64,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default)]
        before_timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMessage { message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Typing { room_id: i64, is_typing: bool },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: i64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RoomServerEvent {
    ChatHistory(MessagePage),
    #[serde(rename_all = "camelCase")]
    OnlineUsers { room_id: i64, users: Vec<i64> },
    NewMessage(OutboundMessage),
    MoreMessages(MessagePage),
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        room_id: i64,
        user_id: i64,
        nickname: String,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft { room_id: i64, user_id: i64 },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        room_id: i64,
        user_id: i64,
        is_typing: bool,
    },
    Error(ErrorPayload),
}

// ---- direct chat namespace ------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum DirectClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinPrivateRoom { receiver_id: i64 },
    #[serde(rename_all = "camelCase")]
    SendPrivateMessage {
        conversation_id: Uuid,
        message: String,
        #[serde(default)]
        message_type: Option<MessageKind>,
        #[serde(default)]
        attachment_url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DeletePrivateMessage { message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    PrivateTyping {
        conversation_id: Uuid,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    MarkPrivateMessagesAsRead { conversation_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeavePrivateRoom { conversation_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum DirectServerEvent {
    #[serde(rename_all = "camelCase")]
    JoinedPrivateRoom {
        conversation: Conversation,
        history: MessagePage,
        peer_online: bool,
    },
    NewPrivateMessage(OutboundMessage),
    #[serde(rename_all = "camelCase")]
    PrivateMessageDeleted { message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserPrivateTyping {
        conversation_id: Uuid,
        user_id: i64,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    MessagesMarkedAsRead {
        conversation_id: Uuid,
        reader_id: i64,
        message_ids: Vec<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: i64 },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: i64 },
    Error(ErrorPayload),
}
