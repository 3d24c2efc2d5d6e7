use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Conversation;
use crate::Result;

/// Storage operations for direct conversations. Callers pass the pair
/// already normalized (low < high).
#[async_trait]
pub trait Data: Send + Sync {
    /// Return the conversation for the pair, creating it if absent. At most
    /// one row ever exists per normalized pair.
    async fn find_or_create(&self, user_low: i64, user_high: i64) -> Result<Conversation>;

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    /// Conversations where the user's deleted-for-me flag is not set,
    /// most recently active first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Conversation>>;

    /// Update the denormalized last-message fields and clear the receiver's
    /// deleted-for-me flag.
    async fn touch(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
        receiver_id: i64,
    ) -> Result<()>;

    /// Set the user's deleted-for-me flag.
    async fn set_deleted(&self, conversation_id: Uuid, user_id: i64) -> Result<()>;
}
