// =============================================================================
// FitPulse Social Fitness Backend - Admission Endpoints
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

use axum::{extract::Path, http::StatusCode, Json};

use super::AuthUser;
use crate::service::participation::EnrichedParticipant;
use crate::{services, Result};

/// # `POST /api/challenges/{room_id}/participants`
///
/// Admit the caller while the room is PENDING and below capacity.
pub async fn join_challenge(
    Path(room_id): Path<i64>,
    AuthUser(user): AuthUser,
) -> Result<(StatusCode, Json<EnrichedParticipant>)> {
    let participant = services()
        .participation
        .create_participant(room_id, user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

/// # `DELETE /api/challenges/{room_id}/participants`
///
/// Withdraw the caller before the challenge starts.
pub async fn leave_challenge(
    Path(room_id): Path<i64>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode> {
    services()
        .participation
        .remove_participant(room_id, user.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// # `GET /api/challenges/{room_id}/participants`
///
/// Current roster (short-TTL cached; admission changes frequently while
/// enrollment is open).
pub async fn challenge_participants(
    Path(room_id): Path<i64>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<EnrichedParticipant>>> {
    let roster = services().participation.participants_of(room_id).await?;
    Ok(Json(roster))
}
