// =============================================================================
// FitPulse Social Fitness Backend - Conversation Storage
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::PostgresDb;
use crate::service::direct::{Conversation, Data};
use crate::Result;

const CONVERSATION_COLUMNS: &str = "id, user_low, user_high, last_message, last_message_at, \
                                    deleted_for_low, deleted_for_high, created_at";

fn conversation_from_row(row: &PgRow) -> Result<Conversation> {
    Ok(Conversation {
        id: row.try_get("id")?,
        user_low: row.try_get("user_low")?,
        user_high: row.try_get("user_high")?,
        last_message: row.try_get("last_message")?,
        last_message_at: row.try_get("last_message_at")?,
        deleted_for_low: row.try_get("deleted_for_low")?,
        deleted_for_high: row.try_get("deleted_for_high")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Data for PostgresDb {
    async fn find_or_create(&self, user_low: i64, user_high: i64) -> Result<Conversation> {
        // the no-op DO UPDATE makes the statement return the existing row
        // on conflict, so both the create and find case are one round trip
        let row = sqlx::query(&format!(
            "INSERT INTO conversations (id, user_low, user_high) VALUES ($1, $2, $3)
             ON CONFLICT (user_low, user_high) DO UPDATE SET user_low = EXCLUDED.user_low
             RETURNING {CONVERSATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_low)
        .bind(user_high)
        .fetch_one(&self.pool)
        .await?;
        conversation_from_row(&row)
    }

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE (user_low = $1 AND NOT deleted_for_low)
                OR (user_high = $1 AND NOT deleted_for_high)
             ORDER BY last_message_at DESC NULLS LAST, created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(conversation_from_row).collect()
    }

    async fn touch(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
        receiver_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET
                last_message = $2,
                last_message_at = $3,
                deleted_for_low = CASE WHEN user_low = $4 THEN FALSE ELSE deleted_for_low END,
                deleted_for_high = CASE WHEN user_high = $4 THEN FALSE ELSE deleted_for_high END
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(preview)
        .bind(at)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_deleted(&self, conversation_id: Uuid, user_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET
                deleted_for_low = CASE WHEN user_low = $2 THEN TRUE ELSE deleted_for_low END,
                deleted_for_high = CASE WHEN user_high = $2 THEN TRUE ELSE deleted_for_high END
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
