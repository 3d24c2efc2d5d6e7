// =============================================================================
// FitPulse Social Fitness Backend - Message Store
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Durable append-only chat log per container, with soft-delete and read
//   receipts. A container is either a challenge room ("room:{id}") or a
//   direct conversation ("dm:{id}"); the container key doubles as the
//   broadcast room name on the bus.
//
//   History reads go through the page cache. The first page is always read
//   from the store because it goes stale on every send; deeper pages are
//   effectively immutable and cache well.
//
// =============================================================================

pub mod data;

pub use data::Data;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::service::cache;
use crate::{Error, Result};

/// Hard cap on message body length, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

pub fn room_container(room_id: i64) -> String {
    format!("room:{room_id}")
}

pub fn direct_container(conversation_id: Uuid) -> String {
    format!("dm:{conversation_id}")
}

/// Recover the challenge-room id from a "room:{id}" container key.
pub fn parse_room_container(container: &str) -> Option<i64> {
    container.strip_prefix("room:")?.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    File,
    SystemJoin,
    SystemLeave,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::SystemJoin => "system_join",
            MessageKind::SystemLeave => "system_leave",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "file" => Some(MessageKind::File),
            "system_join" => Some(MessageKind::SystemJoin),
            "system_leave" => Some(MessageKind::SystemLeave),
            _ => None,
        }
    }
}

/// A persisted chat message. Container and sender never change after
/// creation; only the soft-delete flag (and receipts) mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub container: String,
    pub sender_id: i64,
    pub body: String,
    pub kind: MessageKind,
    pub attachment_url: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// A message enriched with the sender's display identity, as broadcast to
/// clients. `is_read` is only populated for direct chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(flatten)]
    pub message: Message,
    pub sender_nickname: String,
    pub sender_avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub container: String,
    pub sender_id: i64,
    pub body: String,
    pub kind: MessageKind,
    pub attachment_url: Option<String>,
}

/// One page of history plus pagination metadata, oldest message first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<OutboundMessage>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

pub struct Service {
    pub db: &'static dyn Data,
    pub cache: Arc<cache::Service>,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("messages::Service").finish()
    }
}

impl Service {
    /// Validate and persist a message, returning it enriched with the
    /// sender's display identity for immediate broadcast.
    #[instrument(level = "debug", skip(self, body))]
    pub async fn append(
        &self,
        sender_id: i64,
        container: &str,
        body: &str,
        kind: Option<MessageKind>,
        attachment_url: Option<String>,
    ) -> Result<OutboundMessage> {
        let kind = kind.unwrap_or(MessageKind::Text);
        if kind == MessageKind::Text && body.trim().is_empty() {
            return Err(Error::Validation("message body must not be empty".to_owned()));
        }
        if body.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(Error::Validation(format!(
                "message exceeds {MAX_MESSAGE_LENGTH} characters"
            )));
        }

        let message = self
            .db
            .append(&NewMessage {
                container: container.to_owned(),
                sender_id,
                body: body.to_owned(),
                kind,
                attachment_url,
            })
            .await?;
        self.cache.invalidate_container(container).await;
        Ok(message)
    }

    /// Read-through paginated history, oldest first within the page. The
    /// store is queried newest-first and the window reversed, so page 1 is
    /// always the latest messages regardless of how many exist.
    #[instrument(level = "debug", skip(self))]
    pub async fn history(
        &self,
        container: &str,
        page: Option<u32>,
        limit: Option<u32>,
        before: Option<DateTime<Utc>>,
    ) -> Result<MessagePage> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(self.default_page_limit)
            .clamp(1, self.max_page_limit);
        let key =
            cache::Service::page_key(container, page, limit, before.map(|t| t.timestamp_millis()));

        // The latest page is the one most likely to be stale right after a
        // send; always re-read it from the store.
        let first_page = page == 1 && before.is_none();
        if !first_page {
            if let Some(hit) = self.cache.get::<MessagePage>(&key).await {
                return Ok(hit);
            }
        }

        let offset = (page - 1) * limit;
        let mut messages = self.db.page(container, limit, offset, before).await?;
        let total = self.db.count(container, before).await?;
        messages.reverse();

        let page_data = MessagePage {
            messages,
            page,
            limit,
            total,
            has_more: u64::from(offset + limit) < total,
        };
        let ttl = if first_page {
            self.cache.first_page_ttl()
        } else {
            self.cache.deep_page_ttl()
        };
        self.cache.set(&key, &page_data, ttl).await;
        Ok(page_data)
    }

    pub async fn get(&self, message_id: Uuid) -> Result<Option<Message>> {
        self.db.get(message_id).await
    }

    /// Sender-only soft delete. Returns `None` (and changes nothing) when the
    /// requester does not own the message or it is already deleted.
    #[instrument(level = "debug", skip(self))]
    pub async fn soft_delete(
        &self,
        message_id: Uuid,
        requester_id: i64,
    ) -> Result<Option<Message>> {
        let deleted = self.db.soft_delete(message_id, requester_id).await?;
        if let Some(message) = &deleted {
            self.cache.invalidate_container(&message.container).await;
        }
        Ok(deleted)
    }

    pub async fn export_range(
        &self,
        container: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        self.db.export_range(container, from, to).await
    }

    /// Idempotent read receipt; returns whether a receipt was created.
    pub async fn mark_read(&self, message_id: Uuid, reader_id: i64) -> Result<bool> {
        let created = self.db.mark_read(message_id, reader_id).await?;
        if created {
            if let Some(message) = self.db.get(message_id).await? {
                self.cache.invalidate_container(&message.container).await;
            }
        }
        Ok(created)
    }

    /// Receipt every unread message in the container that the reader did not
    /// send, in one batch. Returns the receipted message ids.
    pub async fn mark_all_read(&self, container: &str, reader_id: i64) -> Result<Vec<Uuid>> {
        let marked = self.db.mark_all_read(container, reader_id).await?;
        if !marked.is_empty() {
            self.cache.invalidate_container(container).await;
        }
        Ok(marked)
    }

    /// Non-deleted messages in the container the user has not read and did
    /// not send.
    pub async fn unread_count(&self, container: &str, user_id: i64) -> Result<u64> {
        self.db.unread_count(container, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Validation failures must reject before any store access.
    struct UnreachableData;

    #[async_trait]
    impl Data for UnreachableData {
        async fn append(&self, _: &NewMessage) -> Result<OutboundMessage> {
            panic!("store reached after failed validation");
        }
        async fn get(&self, _: Uuid) -> Result<Option<Message>> {
            panic!("store reached after failed validation");
        }
        async fn page(
            &self,
            _: &str,
            _: u32,
            _: u32,
            _: Option<DateTime<Utc>>,
        ) -> Result<Vec<OutboundMessage>> {
            panic!("store reached after failed validation");
        }
        async fn count(&self, _: &str, _: Option<DateTime<Utc>>) -> Result<u64> {
            panic!("store reached after failed validation");
        }
        async fn soft_delete(&self, _: Uuid, _: i64) -> Result<Option<Message>> {
            panic!("store reached after failed validation");
        }
        async fn export_range(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Vec<Message>> {
            panic!("store reached after failed validation");
        }
        async fn mark_read(&self, _: Uuid, _: i64) -> Result<bool> {
            panic!("store reached after failed validation");
        }
        async fn mark_all_read(&self, _: &str, _: i64) -> Result<Vec<Uuid>> {
            panic!("store reached after failed validation");
        }
        async fn unread_count(&self, _: &str, _: i64) -> Result<u64> {
            panic!("store reached after failed validation");
        }
    }

    fn service_with_unreachable_store() -> Service {
        Service {
            db: Box::leak(Box::new(UnreachableData)),
            cache: Arc::new(cache::Service::local(
                Duration::from_secs(30),
                Duration::from_secs(3600),
                Duration::from_secs(30),
            )),
            default_page_limit: 50,
            max_page_limit: 100,
        }
    }

    #[tokio::test]
    async fn test_empty_text_body_is_rejected() {
        let service = service_with_unreachable_store();
        let err = service
            .append(1, "room:1", "   ", Some(MessageKind::Text), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let service = service_with_unreachable_store();
        let body = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        let err = service
            .append(1, "room:1", &body, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_cap_applies_to_non_text_kinds_too() {
        let service = service_with_unreachable_store();
        let body = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        let err = service
            .append(1, "room:1", &body, Some(MessageKind::Image), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_kind_round_trips_through_storage_form() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::File,
            MessageKind::SystemJoin,
            MessageKind::SystemLeave,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("video"), None);
    }

    #[test]
    fn test_container_keys() {
        assert_eq!(room_container(12), "room:12");
        assert_eq!(parse_room_container("room:12"), Some(12));
        assert_eq!(parse_room_container("dm:12"), None);
        let id = Uuid::nil();
        assert_eq!(
            direct_container(id),
            "dm:00000000-0000-0000-0000-000000000000"
        );
    }
}
