// =============================================================================
// FitPulse Social Fitness Backend - Challenge Admission Coordinator
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Real-time view over challenge-room participation. Room lifecycle
//   (PENDING -> ONGOING -> COMPLETED) is owned by the scheduling layer; this
//   coordinator enforces the admission window and capacity, keeps the
//   participant counter in step with the rows, and fans out roster changes
//   so connected clients see admissions live.
//
//   The capacity check and counter increment are one conditional UPDATE
//   inside the admission transaction, so concurrent admissions can never
//   exceed capacity.
//
// =============================================================================

pub mod data;

pub use data::{AdmitOutcome, Data, WithdrawOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::service::{bus, cache, messages};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Pending,
    Ongoing,
    Completed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Pending => "PENDING",
            RoomStatus::Ongoing => "ONGOING",
            RoomStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RoomStatus::Pending),
            "ONGOING" => Some(RoomStatus::Ongoing),
            "COMPLETED" => Some(RoomStatus::Completed),
            _ => None,
        }
    }
}

pub type ParticipantStatus = RoomStatus;

/// Capacity and lifecycle snapshot of a challenge room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: i64,
    pub status: RoomStatus,
    pub max_participants: i32,
    pub current_participants: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: i64,
    pub user_id: i64,
    pub room_id: i64,
    pub status: ParticipantStatus,
    pub created_at: DateTime<Utc>,
}

/// Participant with the display identity joined in for rosters and
/// broadcast payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedParticipant {
    #[serde(flatten)]
    pub participant: Participant,
    pub nickname: String,
    pub avatar_url: Option<String>,
}

pub struct Service {
    pub db: &'static dyn Data,
    pub cache: Arc<cache::Service>,
    pub bus: Arc<bus::Service>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("participation::Service").finish()
    }
}

impl Service {
    /// Admit a user into a challenge room. The room must still be in its
    /// admission window (PENDING), below capacity, and the user must not
    /// already hold a participant record.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_participant(
        &self,
        room_id: i64,
        user_id: i64,
    ) -> Result<EnrichedParticipant> {
        let admitted = match self.db.admit(room_id, user_id).await? {
            AdmitOutcome::Admitted(participant) => participant,
            AdmitOutcome::RoomMissing => {
                return Err(Error::NotFound(format!("unknown challenge room {room_id}")))
            }
            AdmitOutcome::NotPending => {
                return Err(Error::Validation(
                    "challenge is no longer accepting participants".to_owned(),
                ))
            }
            AdmitOutcome::RoomFull => {
                return Err(Error::Conflict("challenge room is full".to_owned()))
            }
            AdmitOutcome::AlreadyJoined => {
                return Err(Error::Conflict(
                    "already participating in this challenge".to_owned(),
                ))
            }
        };

        self.cache.invalidate_roster(room_id).await;
        self.publish_roster_event("participantJoined", room_id, &admitted)
            .await;
        Ok(admitted)
    }

    /// Withdraw before the challenge starts. Once ONGOING or COMPLETED the
    /// roster is frozen.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_participant(&self, room_id: i64, user_id: i64) -> Result<()> {
        let removed = match self.db.withdraw(room_id, user_id).await? {
            WithdrawOutcome::Removed(participant) => participant,
            WithdrawOutcome::RoomMissing => {
                return Err(Error::NotFound(format!("unknown challenge room {room_id}")))
            }
            WithdrawOutcome::NotPending => {
                return Err(Error::Validation(
                    "cannot withdraw after the challenge has started".to_owned(),
                ))
            }
            WithdrawOutcome::NotParticipant => {
                return Err(Error::NotFound(
                    "not participating in this challenge".to_owned(),
                ))
            }
        };

        self.cache.invalidate_roster(room_id).await;
        self.publish_roster_event("participantLeft", room_id, &removed)
            .await;
        Ok(())
    }

    /// Roster, cached briefly: admission state changes often while the
    /// enrollment window is open, so the TTL is tens of seconds.
    pub async fn participants_of(&self, room_id: i64) -> Result<Vec<EnrichedParticipant>> {
        let key = cache::Service::roster_key(room_id);
        if let Some(hit) = self.cache.get::<Vec<EnrichedParticipant>>(&key).await {
            return Ok(hit);
        }
        let roster = self.db.participants(room_id).await?;
        self.cache
            .set(&key, &roster, self.cache.roster_ttl())
            .await;
        Ok(roster)
    }

    /// Whether the user holds an admitted (not withdrawn, not kicked)
    /// participant record; gates joining the room's chat.
    pub async fn is_admitted(&self, room_id: i64, user_id: i64) -> Result<bool> {
        Ok(self
            .participants_of(room_id)
            .await?
            .iter()
            .any(|p| p.participant.user_id == user_id))
    }

    pub async fn room(&self, room_id: i64) -> Result<Option<RoomSummary>> {
        self.db.room(room_id).await
    }

    async fn publish_roster_event(
        &self,
        event: &str,
        room_id: i64,
        participant: &EnrichedParticipant,
    ) {
        let payload = match serde_json::to_value(participant) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        self.bus
            .publish(
                bus::ENTRY_CHANNEL,
                bus::Envelope {
                    room: messages::room_container(room_id),
                    event: event.to_owned(),
                    payload,
                    exclude: None,
                },
            )
            .await;
    }
}
