use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Message, NewMessage, OutboundMessage};
use crate::Result;

/// Storage operations for the message log. `page` returns messages
/// newest-first; the service reverses the window for presentation.
#[async_trait]
pub trait Data: Send + Sync {
    /// Persist a message and return it enriched with the sender's display
    /// identity (a read-after-write join, not a second caller round trip).
    async fn append(&self, message: &NewMessage) -> Result<OutboundMessage>;

    /// Lookup by id, including soft-deleted messages.
    async fn get(&self, message_id: Uuid) -> Result<Option<Message>>;

    /// Non-deleted messages, newest first. `before` restricts to messages
    /// strictly older than the cursor.
    async fn page(
        &self,
        container: &str,
        limit: u32,
        offset: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<OutboundMessage>>;

    async fn count(&self, container: &str, before: Option<DateTime<Utc>>) -> Result<u64>;

    /// Set the deleted flag iff `requester_id` is the sender and the message
    /// is not already deleted. Returns the deleted message, or None as a
    /// no-op.
    async fn soft_delete(&self, message_id: Uuid, requester_id: i64) -> Result<Option<Message>>;

    /// Non-deleted messages in `[from, to]`, oldest first.
    async fn export_range(
        &self,
        container: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Message>>;

    /// Insert a receipt for (message, reader) unless one exists. Returns
    /// whether a receipt was created.
    async fn mark_read(&self, message_id: Uuid, reader_id: i64) -> Result<bool>;

    /// Batch-receipt every non-deleted message in the container that the
    /// reader did not send and has not receipted. Returns the affected ids.
    async fn mark_all_read(&self, container: &str, reader_id: i64) -> Result<Vec<Uuid>>;

    async fn unread_count(&self, container: &str, user_id: i64) -> Result<u64>;
}
