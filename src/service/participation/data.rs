use async_trait::async_trait;

use super::{EnrichedParticipant, RoomSummary};
use crate::Result;

/// Result of an admission attempt. The storage layer reports what actually
/// happened inside the transaction; the service maps outcomes to domain
/// errors.
#[derive(Debug)]
pub enum AdmitOutcome {
    Admitted(EnrichedParticipant),
    RoomMissing,
    NotPending,
    RoomFull,
    AlreadyJoined,
}

#[derive(Debug)]
pub enum WithdrawOutcome {
    Removed(EnrichedParticipant),
    RoomMissing,
    NotPending,
    NotParticipant,
}

#[async_trait]
pub trait Data: Send + Sync {
    async fn room(&self, room_id: i64) -> Result<Option<RoomSummary>>;

    /// Admit atomically: the capacity check and counter increment must be a
    /// single conditional update so concurrent admissions cannot overshoot
    /// `max_participants`. Returns the participant enriched with display
    /// identity.
    async fn admit(&self, room_id: i64, user_id: i64) -> Result<AdmitOutcome>;

    /// Remove the participant while the room is still PENDING and decrement
    /// the counter, floored at zero.
    async fn withdraw(&self, room_id: i64, user_id: i64) -> Result<WithdrawOutcome>;

    /// Full roster with display identities, oldest admission first.
    async fn participants(&self, room_id: i64) -> Result<Vec<EnrichedParticipant>>;
}
