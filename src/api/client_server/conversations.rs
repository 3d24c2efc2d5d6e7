// =============================================================================
// FitPulse Social Fitness Backend - Conversation Endpoints
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::messages::HistoryParams;
use super::AuthUser;
use crate::api::gateway::{broadcast, events::DirectServerEvent};
use crate::service::bus;
use crate::service::messages::MessagePage;
use crate::service::users::UserIdentity;
use crate::{services, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub peer: Option<UserIdentity>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub conversation_id: Uuid,
    pub message_ids: Vec<Uuid>,
}

/// # `GET /api/conversations`
///
/// The caller's conversation list, most recently active first. Hidden
/// entries (deleted-for-me) are filtered by the store.
pub async fn list_conversations(
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ConversationSummary>>> {
    let svc = services();
    let conversations = svc.direct.list_for_user(user.user_id).await?;
    let mut summaries = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let peer_id = conversation.peer_of(user.user_id);
        let peer = svc.users.identity(peer_id).await?;
        let unread_count = svc
            .messages
            .unread_count(&conversation.container(), user.user_id)
            .await?;
        summaries.push(ConversationSummary {
            id: conversation.id,
            peer,
            last_message: conversation.last_message,
            last_message_at: conversation.last_message_at,
            unread_count,
        });
    }
    Ok(Json(summaries))
}

/// # `GET /api/conversations/{id}/messages`
pub async fn conversation_history(
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
    AuthUser(user): AuthUser,
) -> Result<Json<MessagePage>> {
    let svc = services();
    let conversation = svc.direct.require_party(conversation_id, user.user_id).await?;
    let page = svc
        .messages
        .history(
            &conversation.container(),
            params.page,
            params.limit,
            params.before,
        )
        .await?;
    Ok(Json(page))
}

/// # `POST /api/conversations/{id}/read`
///
/// Mark every unread message in the conversation as read, mirroring the
/// gateway event for clients reading over HTTP. Connected peers still see
/// the receipt broadcast.
pub async fn mark_conversation_read(
    Path(conversation_id): Path<Uuid>,
    AuthUser(user): AuthUser,
) -> Result<Json<MarkReadResponse>> {
    let svc = services();
    let conversation = svc.direct.require_party(conversation_id, user.user_id).await?;
    let message_ids = svc
        .messages
        .mark_all_read(&conversation.container(), user.user_id)
        .await?;
    broadcast(
        bus::DIRECT_CHANNEL,
        &conversation.container(),
        &DirectServerEvent::MessagesMarkedAsRead {
            conversation_id,
            reader_id: user.user_id,
            message_ids: message_ids.clone(),
        },
        None,
    )
    .await;
    Ok(Json(MarkReadResponse {
        conversation_id,
        message_ids,
    }))
}

/// # `DELETE /api/conversations/{id}`
///
/// Hide the conversation from the caller's list. The row survives while it
/// may still be visible to the other party.
pub async fn delete_conversation(
    Path(conversation_id): Path<Uuid>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode> {
    let svc = services();
    svc.direct.require_party(conversation_id, user.user_id).await?;
    svc.direct.delete_for(conversation_id, user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
