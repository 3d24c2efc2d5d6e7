// =============================================================================
// FitPulse Social Fitness Backend - Participation Storage
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Admission transaction. The capacity check rides on a conditional
//   UPDATE of the room counter: under concurrent admissions the row lock
//   serializes the increments, so the counter can never pass
//   max_participants and the participant insert is guarded by the
//   (user_id, room_id) uniqueness constraint.
//
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::PostgresDb;
use crate::service::participation::{
    AdmitOutcome, Data, EnrichedParticipant, Participant, ParticipantStatus, RoomStatus,
    RoomSummary, WithdrawOutcome,
};
use crate::Result;

fn room_from_row(row: &PgRow) -> Result<RoomSummary> {
    let status_raw: String = row.try_get("status")?;
    Ok(RoomSummary {
        id: row.try_get("id")?,
        status: RoomStatus::parse(&status_raw).unwrap_or(RoomStatus::Completed),
        max_participants: row.try_get("max_participants")?,
        current_participants: row.try_get("current_participants")?,
    })
}

fn enriched_from_row(row: &PgRow) -> Result<EnrichedParticipant> {
    let status_raw: String = row.try_get("status")?;
    Ok(EnrichedParticipant {
        participant: Participant {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            room_id: row.try_get("room_id")?,
            status: ParticipantStatus::parse(&status_raw).unwrap_or(ParticipantStatus::Pending),
            created_at: row.try_get("created_at")?,
        },
        nickname: row.try_get("nickname")?,
        avatar_url: row.try_get("avatar_url")?,
    })
}

#[async_trait]
impl Data for PostgresDb {
    async fn room(&self, room_id: i64) -> Result<Option<RoomSummary>> {
        let row = sqlx::query(
            "SELECT id, status, max_participants, current_participants
             FROM challenge_rooms WHERE id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(room_from_row).transpose()
    }

    async fn admit(&self, room_id: i64, user_id: i64) -> Result<AdmitOutcome> {
        let mut tx = self.pool.begin().await?;

        let room = sqlx::query("SELECT status FROM challenge_rooms WHERE id = $1")
            .bind(room_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(room) = room else {
            return Ok(AdmitOutcome::RoomMissing);
        };
        let status_raw: String = room.try_get("status")?;
        if RoomStatus::parse(&status_raw) != Some(RoomStatus::Pending) {
            return Ok(AdmitOutcome::NotPending);
        }

        let duplicate = sqlx::query("SELECT 1 FROM participants WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if duplicate.is_some() {
            return Ok(AdmitOutcome::AlreadyJoined);
        }

        // capacity check and counter increment in one statement; the row
        // lock serializes concurrent admissions
        let incremented = sqlx::query(
            "UPDATE challenge_rooms SET current_participants = current_participants + 1
             WHERE id = $1 AND status = 'PENDING'
               AND current_participants < max_participants",
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
        if incremented.rows_affected() == 0 {
            return Ok(AdmitOutcome::RoomFull);
        }

        let inserted = sqlx::query(
            "INSERT INTO participants (user_id, room_id, status) VALUES ($1, $2, 'PENDING')
             ON CONFLICT (user_id, room_id) DO NOTHING
             RETURNING id, created_at",
        )
        .bind(user_id)
        .bind(room_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(inserted) = inserted else {
            // lost a duplicate-admission race; dropping the transaction
            // rolls the increment back
            return Ok(AdmitOutcome::AlreadyJoined);
        };
        let id: i64 = inserted.try_get("id")?;
        let created_at: DateTime<Utc> = inserted.try_get("created_at")?;

        let identity = sqlx::query("SELECT nickname, avatar_url FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let (nickname, avatar_url) = match identity {
            Some(row) => (row.try_get("nickname")?, row.try_get("avatar_url")?),
            None => ("unknown".to_owned(), None),
        };

        tx.commit().await?;
        Ok(AdmitOutcome::Admitted(EnrichedParticipant {
            participant: Participant {
                id,
                user_id,
                room_id,
                status: ParticipantStatus::Pending,
                created_at,
            },
            nickname,
            avatar_url,
        }))
    }

    async fn withdraw(&self, room_id: i64, user_id: i64) -> Result<WithdrawOutcome> {
        let mut tx = self.pool.begin().await?;

        let room = sqlx::query("SELECT status FROM challenge_rooms WHERE id = $1")
            .bind(room_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(room) = room else {
            return Ok(WithdrawOutcome::RoomMissing);
        };
        let status_raw: String = room.try_get("status")?;
        if RoomStatus::parse(&status_raw) != Some(RoomStatus::Pending) {
            return Ok(WithdrawOutcome::NotPending);
        }

        let removed = sqlx::query(
            "DELETE FROM participants WHERE room_id = $1 AND user_id = $2
             RETURNING id, status, created_at",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(removed) = removed else {
            return Ok(WithdrawOutcome::NotParticipant);
        };
        let id: i64 = removed.try_get("id")?;
        let status_raw: String = removed.try_get("status")?;
        let created_at: DateTime<Utc> = removed.try_get("created_at")?;

        sqlx::query(
            "UPDATE challenge_rooms
             SET current_participants = GREATEST(current_participants - 1, 0)
             WHERE id = $1",
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await?;

        let identity = sqlx::query("SELECT nickname, avatar_url FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let (nickname, avatar_url) = match identity {
            Some(row) => (row.try_get("nickname")?, row.try_get("avatar_url")?),
            None => ("unknown".to_owned(), None),
        };

        tx.commit().await?;
        Ok(WithdrawOutcome::Removed(EnrichedParticipant {
            participant: Participant {
                id,
                user_id,
                room_id,
                status: ParticipantStatus::parse(&status_raw)
                    .unwrap_or(ParticipantStatus::Pending),
                created_at,
            },
            nickname,
            avatar_url,
        }))
    }

    async fn participants(&self, room_id: i64) -> Result<Vec<EnrichedParticipant>> {
        let rows = sqlx::query(
            "SELECT p.id, p.user_id, p.room_id, p.status, p.created_at,
                    COALESCE(u.nickname, 'unknown') AS nickname, u.avatar_url
             FROM participants p
             LEFT JOIN users u ON u.id = p.user_id
             WHERE p.room_id = $1
             ORDER BY p.created_at ASC, p.id ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(enriched_from_row).collect()
    }
}
