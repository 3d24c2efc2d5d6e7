//! Shared in-memory storage backend for integration tests.
//!
//! Implements every Data trait against mutexed vectors so the service layer
//! can be exercised without PostgreSQL. Timestamps are handed out from a
//! monotonic counter, so insertion order and chronological order agree
//! unless a test reorders on purpose.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use fitpulse::service::direct::{self, Conversation};
use fitpulse::service::messages::{self, Message, NewMessage, OutboundMessage};
use fitpulse::service::participation::{
    self, AdmitOutcome, EnrichedParticipant, Participant, ParticipantStatus, RoomStatus,
    RoomSummary, WithdrawOutcome,
};
use fitpulse::service::users::{self, UserIdentity};
use fitpulse::service::{bus, cache};
use fitpulse::Result;

#[derive(Default)]
pub struct MemoryDb {
    users: Mutex<HashMap<i64, UserIdentity>>,
    messages: Mutex<Vec<Message>>,
    receipts: Mutex<HashSet<(Uuid, i64)>>,
    conversations: Mutex<Vec<Conversation>>,
    rooms: Mutex<HashMap<i64, RoomSummary>>,
    participants: Mutex<Vec<Participant>>,
    next_participant_id: AtomicI64,
    clock: AtomicI64,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaked() -> &'static Self {
        Box::leak(Box::new(Self::new()))
    }

    /// Strictly increasing timestamps.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + ChronoDuration::microseconds(tick)
    }

    pub fn add_user(&self, user_id: i64, nickname: &str) {
        self.users.lock().unwrap().insert(
            user_id,
            UserIdentity {
                user_id,
                nickname: nickname.to_owned(),
                avatar_url: None,
            },
        );
    }

    pub fn add_room(&self, room_id: i64, status: RoomStatus, max_participants: i32) {
        self.rooms.lock().unwrap().insert(
            room_id,
            RoomSummary {
                id: room_id,
                status,
                max_participants,
                current_participants: 0,
            },
        );
    }

    pub fn room_counter(&self, room_id: i64) -> i32 {
        self.rooms.lock().unwrap()[&room_id].current_participants
    }

    pub fn participant_rows(&self, room_id: i64) -> usize {
        self.participants
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.room_id == room_id)
            .count()
    }

    pub fn receipt_count(&self, message_id: Uuid) -> usize {
        self.receipts
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == message_id)
            .count()
    }

    fn nickname_of(&self, user_id: i64) -> (String, Option<String>) {
        match self.users.lock().unwrap().get(&user_id) {
            Some(identity) => (identity.nickname.clone(), identity.avatar_url.clone()),
            None => ("unknown".to_owned(), None),
        }
    }

    fn outbound(&self, message: Message) -> OutboundMessage {
        let (sender_nickname, sender_avatar_url) = self.nickname_of(message.sender_id);
        OutboundMessage {
            message,
            sender_nickname,
            sender_avatar_url,
            is_read: None,
        }
    }
}

#[async_trait]
impl messages::Data for MemoryDb {
    async fn append(&self, new: &NewMessage) -> Result<OutboundMessage> {
        let message = Message {
            id: Uuid::new_v4(),
            container: new.container.clone(),
            sender_id: new.sender_id,
            body: new.body.clone(),
            kind: new.kind,
            attachment_url: new.attachment_url.clone(),
            deleted: false,
            created_at: self.next_timestamp(),
        };
        self.messages.lock().unwrap().push(message.clone());
        Ok(self.outbound(message))
    }

    async fn get(&self, message_id: Uuid) -> Result<Option<Message>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    async fn page(
        &self,
        container: &str,
        limit: u32,
        offset: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<OutboundMessage>> {
        let mut window: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                m.container == container
                    && !m.deleted
                    && before.map(|cursor| m.created_at < cursor).unwrap_or(true)
            })
            .cloned()
            .collect();
        window.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(window
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|m| self.outbound(m))
            .collect())
    }

    async fn count(&self, container: &str, before: Option<DateTime<Utc>>) -> Result<u64> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                m.container == container
                    && !m.deleted
                    && before.map(|cursor| m.created_at < cursor).unwrap_or(true)
            })
            .count() as u64)
    }

    async fn soft_delete(&self, message_id: Uuid, requester_id: i64) -> Result<Option<Message>> {
        let mut messages = self.messages.lock().unwrap();
        match messages
            .iter_mut()
            .find(|m| m.id == message_id && m.sender_id == requester_id && !m.deleted)
        {
            Some(message) => {
                message.deleted = true;
                Ok(Some(message.clone()))
            }
            None => Ok(None),
        }
    }

    async fn export_range(
        &self,
        container: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        let mut window: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                m.container == container
                    && !m.deleted
                    && m.created_at >= from
                    && m.created_at <= to
            })
            .cloned()
            .collect();
        window.sort_by_key(|m| m.created_at);
        Ok(window)
    }

    async fn mark_read(&self, message_id: Uuid, reader_id: i64) -> Result<bool> {
        Ok(self.receipts.lock().unwrap().insert((message_id, reader_id)))
    }

    async fn mark_all_read(&self, container: &str, reader_id: i64) -> Result<Vec<Uuid>> {
        let unread: Vec<Uuid> = {
            let receipts = self.receipts.lock().unwrap();
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| {
                    m.container == container
                        && m.sender_id != reader_id
                        && !m.deleted
                        && !receipts.contains(&(m.id, reader_id))
                })
                .map(|m| m.id)
                .collect()
        };
        let mut receipts = self.receipts.lock().unwrap();
        for id in &unread {
            receipts.insert((*id, reader_id));
        }
        Ok(unread)
    }

    async fn unread_count(&self, container: &str, user_id: i64) -> Result<u64> {
        let receipts = self.receipts.lock().unwrap();
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                m.container == container
                    && m.sender_id != user_id
                    && !m.deleted
                    && !receipts.contains(&(m.id, user_id))
            })
            .count() as u64)
    }
}

#[async_trait]
impl direct::Data for MemoryDb {
    async fn find_or_create(&self, user_low: i64, user_high: i64) -> Result<Conversation> {
        let mut conversations = self.conversations.lock().unwrap();
        if let Some(existing) = conversations
            .iter()
            .find(|c| c.user_low == user_low && c.user_high == user_high)
        {
            return Ok(existing.clone());
        }
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_low,
            user_high,
            last_message: None,
            last_message_at: None,
            deleted_for_low: false,
            deleted_for_high: false,
            created_at: self.next_timestamp(),
        };
        conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let mut visible: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.involves(user_id) && !c.deleted_for(user_id))
            .cloned()
            .collect();
        visible.sort_by(|a, b| {
            b.last_message_at
                .unwrap_or(b.created_at)
                .cmp(&a.last_message_at.unwrap_or(a.created_at))
        });
        Ok(visible)
    }

    async fn touch(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
        receiver_id: i64,
    ) -> Result<()> {
        let mut conversations = self.conversations.lock().unwrap();
        if let Some(conversation) = conversations.iter_mut().find(|c| c.id == conversation_id) {
            conversation.last_message = Some(preview.to_owned());
            conversation.last_message_at = Some(at);
            if conversation.user_low == receiver_id {
                conversation.deleted_for_low = false;
            }
            if conversation.user_high == receiver_id {
                conversation.deleted_for_high = false;
            }
        }
        Ok(())
    }

    async fn set_deleted(&self, conversation_id: Uuid, user_id: i64) -> Result<()> {
        let mut conversations = self.conversations.lock().unwrap();
        if let Some(conversation) = conversations.iter_mut().find(|c| c.id == conversation_id) {
            if conversation.user_low == user_id {
                conversation.deleted_for_low = true;
            }
            if conversation.user_high == user_id {
                conversation.deleted_for_high = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl participation::Data for MemoryDb {
    async fn room(&self, room_id: i64) -> Result<Option<RoomSummary>> {
        Ok(self.rooms.lock().unwrap().get(&room_id).cloned())
    }

    async fn admit(&self, room_id: i64, user_id: i64) -> Result<AdmitOutcome> {
        // one lock over rooms+participants stands in for the transaction
        let mut rooms = self.rooms.lock().unwrap();
        let mut participants = self.participants.lock().unwrap();

        let Some(room) = rooms.get_mut(&room_id) else {
            return Ok(AdmitOutcome::RoomMissing);
        };
        if room.status != RoomStatus::Pending {
            return Ok(AdmitOutcome::NotPending);
        }
        if participants
            .iter()
            .any(|p| p.room_id == room_id && p.user_id == user_id)
        {
            return Ok(AdmitOutcome::AlreadyJoined);
        }
        if room.current_participants >= room.max_participants {
            return Ok(AdmitOutcome::RoomFull);
        }

        room.current_participants += 1;
        let participant = Participant {
            id: self.next_participant_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            room_id,
            status: ParticipantStatus::Pending,
            created_at: self.next_timestamp(),
        };
        participants.push(participant.clone());
        let (nickname, avatar_url) = self.nickname_of(user_id);
        Ok(AdmitOutcome::Admitted(EnrichedParticipant {
            participant,
            nickname,
            avatar_url,
        }))
    }

    async fn withdraw(&self, room_id: i64, user_id: i64) -> Result<WithdrawOutcome> {
        let mut rooms = self.rooms.lock().unwrap();
        let mut participants = self.participants.lock().unwrap();

        let Some(room) = rooms.get_mut(&room_id) else {
            return Ok(WithdrawOutcome::RoomMissing);
        };
        if room.status != RoomStatus::Pending {
            return Ok(WithdrawOutcome::NotPending);
        }
        let Some(index) = participants
            .iter()
            .position(|p| p.room_id == room_id && p.user_id == user_id)
        else {
            return Ok(WithdrawOutcome::NotParticipant);
        };

        let participant = participants.remove(index);
        room.current_participants = (room.current_participants - 1).max(0);
        let (nickname, avatar_url) = self.nickname_of(user_id);
        Ok(WithdrawOutcome::Removed(EnrichedParticipant {
            participant,
            nickname,
            avatar_url,
        }))
    }

    async fn participants(&self, room_id: i64) -> Result<Vec<EnrichedParticipant>> {
        let mut roster: Vec<Participant> = self
            .participants
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        roster.sort_by_key(|p| p.created_at);
        Ok(roster
            .into_iter()
            .map(|participant| {
                let (nickname, avatar_url) = self.nickname_of(participant.user_id);
                EnrichedParticipant {
                    participant,
                    nickname,
                    avatar_url,
                }
            })
            .collect())
    }
}

#[async_trait]
impl users::Data for MemoryDb {
    async fn identity(&self, user_id: i64) -> Result<Option<UserIdentity>> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }
}

pub fn short_ttl_cache() -> Arc<cache::Service> {
    Arc::new(cache::Service::local(
        Duration::from_secs(30),
        Duration::from_secs(3600),
        Duration::from_secs(30),
    ))
}

pub fn message_service(db: &'static MemoryDb) -> messages::Service {
    messages::Service {
        db,
        cache: short_ttl_cache(),
        default_page_limit: 50,
        max_page_limit: 100,
    }
}

pub fn participation_service(db: &'static MemoryDb) -> participation::Service {
    participation::Service {
        db,
        cache: short_ttl_cache(),
        bus: Arc::new(bus::Service::local()),
    }
}

pub fn direct_service(db: &'static MemoryDb) -> direct::Service {
    direct::Service::new(db)
}
