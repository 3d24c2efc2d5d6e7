// =============================================================================
// FitPulse Social Fitness Backend - PostgreSQL Backend
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   PostgreSQL storage backend. One pool serves every Data trait; the
//   messaging schema is bootstrapped at startup so a fresh database is
//   usable without a separate migration step.
//
// =============================================================================

mod direct;
mod messages;
mod participation;
mod users;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Instant;
use tracing::info;

use crate::service::messages::{Message, MessageKind, OutboundMessage};
use crate::{Config, Result};

const DEFAULT_POOL_SIZE: u32 = 20;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGINT PRIMARY KEY,
        nickname TEXT NOT NULL,
        email TEXT NOT NULL DEFAULT '',
        avatar_url TEXT
    )",
    "CREATE TABLE IF NOT EXISTS challenge_rooms (
        id BIGINT PRIMARY KEY,
        title TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'PENDING',
        max_participants INT NOT NULL DEFAULT 10,
        current_participants INT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS participants (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        room_id BIGINT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (user_id, room_id)
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY,
        container TEXT NOT NULL,
        sender_id BIGINT NOT NULL,
        body TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'text',
        attachment_url TEXT,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS messages_container_created_idx
        ON messages (container, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS message_reads (
        message_id UUID NOT NULL REFERENCES messages (id),
        reader_id BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (message_id, reader_id)
    )",
    "CREATE TABLE IF NOT EXISTS conversations (
        id UUID PRIMARY KEY,
        user_low BIGINT NOT NULL,
        user_high BIGINT NOT NULL,
        last_message TEXT,
        last_message_at TIMESTAMPTZ,
        deleted_for_low BOOLEAN NOT NULL DEFAULT FALSE,
        deleted_for_high BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (user_low, user_high),
        CHECK (user_low < user_high)
    )",
];

pub struct PostgresDb {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDb").finish()
    }
}

impl PostgresDb {
    pub async fn connect(config: &Config) -> Result<Self> {
        let start = Instant::now();
        let pool = PgPoolOptions::new()
            .max_connections(config.db_pool_max_connections.unwrap_or(DEFAULT_POOL_SIZE))
            .connect(&config.database_url)
            .await?;
        info!("📊 PostgreSQL pool ready in {:?}", start.elapsed());
        Ok(Self { pool })
    }

    pub async fn bootstrap_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("✅ messaging schema bootstrapped");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn message_from_row(row: &PgRow) -> Result<Message> {
    let kind_raw: String = row.try_get("kind")?;
    Ok(Message {
        id: row.try_get("id")?,
        container: row.try_get("container")?,
        sender_id: row.try_get("sender_id")?,
        body: row.try_get("body")?,
        kind: MessageKind::parse(&kind_raw).unwrap_or(MessageKind::Text),
        attachment_url: row.try_get("attachment_url")?,
        deleted: row.try_get("deleted")?,
        created_at: row.try_get("created_at")?,
    })
}

fn outbound_from_row(row: &PgRow) -> Result<OutboundMessage> {
    Ok(OutboundMessage {
        message: message_from_row(row)?,
        sender_nickname: row.try_get("sender_nickname")?,
        sender_avatar_url: row.try_get("sender_avatar_url")?,
        is_read: None,
    })
}
