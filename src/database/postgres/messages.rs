// =============================================================================
// FitPulse Social Fitness Backend - Message Storage
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::{message_from_row, outbound_from_row, PostgresDb};
use crate::service::messages::{Data, Message, NewMessage, OutboundMessage};
use crate::Result;

#[async_trait]
impl Data for PostgresDb {
    async fn append(&self, message: &NewMessage) -> Result<OutboundMessage> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO messages (id, container, sender_id, body, kind, attachment_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING created_at",
        )
        .bind(id)
        .bind(&message.container)
        .bind(message.sender_id)
        .bind(&message.body)
        .bind(message.kind.as_str())
        .bind(&message.attachment_url)
        .fetch_one(&self.pool)
        .await?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        // read-after-write join for the broadcast payload
        let identity = sqlx::query("SELECT nickname, avatar_url FROM users WHERE id = $1")
            .bind(message.sender_id)
            .fetch_optional(&self.pool)
            .await?;
        let (sender_nickname, sender_avatar_url) = match identity {
            Some(row) => (row.try_get("nickname")?, row.try_get("avatar_url")?),
            None => ("unknown".to_owned(), None),
        };

        Ok(OutboundMessage {
            message: Message {
                id,
                container: message.container.clone(),
                sender_id: message.sender_id,
                body: message.body.clone(),
                kind: message.kind,
                attachment_url: message.attachment_url.clone(),
                deleted: false,
                created_at,
            },
            sender_nickname,
            sender_avatar_url,
            is_read: None,
        })
    }

    async fn get(&self, message_id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query(
            "SELECT id, container, sender_id, body, kind, attachment_url, deleted, created_at
             FROM messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn page(
        &self,
        container: &str,
        limit: u32,
        offset: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<OutboundMessage>> {
        let rows = sqlx::query(
            "SELECT m.id, m.container, m.sender_id, m.body, m.kind, m.attachment_url,
                    m.deleted, m.created_at,
                    COALESCE(u.nickname, 'unknown') AS sender_nickname,
                    u.avatar_url AS sender_avatar_url
             FROM messages m
             LEFT JOIN users u ON u.id = m.sender_id
             WHERE m.container = $1
               AND m.deleted = FALSE
               AND ($2::timestamptz IS NULL OR m.created_at < $2)
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(container)
        .bind(before)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(outbound_from_row).collect()
    }

    async fn count(&self, container: &str, before: Option<DateTime<Utc>>) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM messages
             WHERE container = $1
               AND deleted = FALSE
               AND ($2::timestamptz IS NULL OR created_at < $2)",
        )
        .bind(container)
        .bind(before)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
    }

    async fn soft_delete(&self, message_id: Uuid, requester_id: i64) -> Result<Option<Message>> {
        let row = sqlx::query(
            "UPDATE messages SET deleted = TRUE
             WHERE id = $1 AND sender_id = $2 AND deleted = FALSE
             RETURNING id, container, sender_id, body, kind, attachment_url, deleted, created_at",
        )
        .bind(message_id)
        .bind(requester_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn export_range(
        &self,
        container: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, container, sender_id, body, kind, attachment_url, deleted, created_at
             FROM messages
             WHERE container = $1 AND deleted = FALSE
               AND created_at >= $2 AND created_at <= $3
             ORDER BY created_at ASC, id ASC",
        )
        .bind(container)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn mark_read(&self, message_id: Uuid, reader_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO message_reads (message_id, reader_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_all_read(&self, container: &str, reader_id: i64) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "INSERT INTO message_reads (message_id, reader_id)
             SELECT m.id, $2 FROM messages m
             WHERE m.container = $1
               AND m.sender_id <> $2
               AND m.deleted = FALSE
               AND NOT EXISTS (
                   SELECT 1 FROM message_reads r
                   WHERE r.message_id = m.id AND r.reader_id = $2
               )
             ON CONFLICT DO NOTHING
             RETURNING message_id",
        )
        .bind(container)
        .bind(reader_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get("message_id").map_err(Into::into))
            .collect()
    }

    async fn unread_count(&self, container: &str, user_id: i64) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM messages m
             WHERE m.container = $1
               AND m.sender_id <> $2
               AND m.deleted = FALSE
               AND NOT EXISTS (
                   SELECT 1 FROM message_reads r
                   WHERE r.message_id = m.id AND r.reader_id = $2
               )",
        )
        .bind(container)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
    }
}
