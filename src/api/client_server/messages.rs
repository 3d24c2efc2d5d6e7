// =============================================================================
// FitPulse Social Fitness Backend - Room History Endpoints
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

use axum::{
    extract::{Path, Query},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuthUser;
use crate::service::messages::{room_container, Message, MessagePage};
use crate::{services, Error, Result};

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineSnapshot {
    pub room_id: i64,
    pub users: Vec<i64>,
}

async fn require_admitted(room_id: i64, user_id: i64) -> Result<()> {
    if services().participation.is_admitted(room_id, user_id).await? {
        Ok(())
    } else {
        Err(Error::Authorization(
            "not a participant of this challenge".to_owned(),
        ))
    }
}

/// # `GET /api/rooms/{room_id}/messages`
///
/// Paginated room history, oldest first within the page.
pub async fn room_history(
    Path(room_id): Path<i64>,
    Query(params): Query<HistoryParams>,
    AuthUser(user): AuthUser,
) -> Result<Json<MessagePage>> {
    require_admitted(room_id, user.user_id).await?;
    let page = services()
        .messages
        .history(
            &room_container(room_id),
            params.page,
            params.limit,
            params.before,
        )
        .await?;
    Ok(Json(page))
}

/// # `GET /api/rooms/{room_id}/messages/export`
///
/// Bulk export of a date range, oldest first. Not paginated; meant for
/// offline backup pulls.
pub async fn room_export(
    Path(room_id): Path<i64>,
    Query(params): Query<ExportParams>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Message>>> {
    require_admitted(room_id, user.user_id).await?;
    if params.from > params.to {
        return Err(Error::Validation(
            "export range start is after its end".to_owned(),
        ));
    }
    let messages = services()
        .messages
        .export_range(&room_container(room_id), params.from, params.to)
        .await?;
    Ok(Json(messages))
}

/// # `GET /api/rooms/{room_id}/online`
///
/// Snapshot of users currently joined to the room on this instance.
pub async fn room_online(
    Path(room_id): Path<i64>,
    AuthUser(user): AuthUser,
) -> Result<Json<OnlineSnapshot>> {
    require_admitted(room_id, user.user_id).await?;
    let users = services()
        .presence
        .online_users_in(&room_container(room_id))
        .await;
    Ok(Json(OnlineSnapshot { room_id, users }))
}
