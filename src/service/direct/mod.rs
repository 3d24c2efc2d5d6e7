// =============================================================================
// FitPulse Social Fitness Backend - Direct Conversations
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   One-to-one conversation management. A conversation is keyed by the
//   normalized (low, high) user pair, so exactly one exists per unordered
//   pair. Each side can hide the conversation from its own list without
//   destroying the row.
//
//   The direct gateway needs finer presence than the generic store: "is my
//   peer looking at THIS conversation" governs synchronous read receipts at
//   send time, while "is my peer online at all" governs push suppression.
//   Both maps live here, per process.
//
// =============================================================================

pub mod data;

pub use data::Data;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::service::messages::direct_container;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_low: i64,
    pub user_high: i64,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub deleted_for_low: bool,
    pub deleted_for_high: bool,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user_id: i64) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    pub fn peer_of(&self, user_id: i64) -> i64 {
        if self.user_low == user_id {
            self.user_high
        } else {
            self.user_low
        }
    }

    pub fn deleted_for(&self, user_id: i64) -> bool {
        if self.user_low == user_id {
            self.deleted_for_low
        } else {
            self.deleted_for_high
        }
    }

    /// Message container key; doubles as the two-party broadcast room name.
    pub fn container(&self) -> String {
        direct_container(self.id)
    }
}

/// Sort an unordered user pair into the canonical (low, high) form.
pub fn normalize_pair(a: i64, b: i64) -> Result<(i64, i64)> {
    if a == b {
        return Err(Error::Validation(
            "cannot open a conversation with yourself".to_owned(),
        ));
    }
    Ok((a.min(b), a.max(b)))
}

pub struct Service {
    pub db: &'static dyn Data,
    sockets: RwLock<HashMap<i64, HashSet<Uuid>>>,
    open_conversations: RwLock<HashMap<i64, HashSet<Uuid>>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("direct::Service").finish()
    }
}

impl Service {
    pub fn new(db: &'static dyn Data) -> Self {
        Self {
            db,
            sockets: RwLock::new(HashMap::new()),
            open_conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Find or create the single conversation for an unordered user pair.
    pub async fn open_conversation(&self, a: i64, b: i64) -> Result<Conversation> {
        let (low, high) = normalize_pair(a, b)?;
        self.db.find_or_create(low, high).await
    }

    pub async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        self.db.get(conversation_id).await
    }

    pub async fn require(&self, conversation_id: Uuid) -> Result<Conversation> {
        self.get(conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("unknown conversation {conversation_id}")))
    }

    /// Lookup plus the two-party membership check.
    pub async fn require_party(&self, conversation_id: Uuid, user_id: i64) -> Result<Conversation> {
        let conversation = self.require(conversation_id).await?;
        if !conversation.involves(user_id) {
            return Err(Error::Authorization(
                "not a party to this conversation".to_owned(),
            ));
        }
        Ok(conversation)
    }

    /// Conversations visible to the user, most recently active first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Conversation>> {
        self.db.list_for_user(user_id).await
    }

    /// Refresh the denormalized last-message fields and resurface the
    /// conversation in the receiver's list.
    pub async fn touch(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
        receiver_id: i64,
    ) -> Result<()> {
        self.db
            .touch(conversation_id, preview, at, receiver_id)
            .await
    }

    /// Hide the conversation from this user's list. The row survives while
    /// it may still be visible to the other party.
    pub async fn delete_for(&self, conversation_id: Uuid, user_id: i64) -> Result<()> {
        self.db.set_deleted(conversation_id, user_id).await
    }

    // ---- per-process peer presence ------------------------------------

    /// Returns true when this is the user's first open socket.
    pub async fn register_socket(&self, user_id: i64, connection_id: Uuid) -> bool {
        let mut sockets = self.sockets.write().await;
        let set = sockets.entry(user_id).or_default();
        let came_online = set.is_empty();
        set.insert(connection_id);
        came_online
    }

    /// Removes the socket. When it was the user's last one, clears and
    /// returns their open-conversation set so the gateway can broadcast
    /// offline notices.
    pub async fn unregister_socket(&self, user_id: i64, connection_id: Uuid) -> Option<Vec<Uuid>> {
        let mut sockets = self.sockets.write().await;
        let went_offline = match sockets.get_mut(&user_id) {
            Some(set) => {
                set.remove(&connection_id);
                if set.is_empty() {
                    sockets.remove(&user_id);
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        drop(sockets);
        if !went_offline {
            return None;
        }
        let open = self
            .open_conversations
            .write()
            .await
            .remove(&user_id)
            .unwrap_or_default();
        Some(open.into_iter().collect())
    }

    pub async fn mark_open(&self, user_id: i64, conversation_id: Uuid) {
        self.open_conversations
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conversation_id);
    }

    pub async fn mark_closed(&self, user_id: i64, conversation_id: Uuid) {
        let mut open = self.open_conversations.write().await;
        if let Some(set) = open.get_mut(&user_id) {
            set.remove(&conversation_id);
            if set.is_empty() {
                open.remove(&user_id);
            }
        }
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.sockets.read().await.contains_key(&user_id)
    }

    /// Whether the user currently has this conversation open somewhere.
    pub async fn has_open(&self, user_id: i64, conversation_id: Uuid) -> bool {
        self.open_conversations
            .read()
            .await
            .get(&user_id)
            .map(|set| set.contains(&conversation_id))
            .unwrap_or(false)
    }
}
