// =============================================================================
// FitPulse Social Fitness Backend - User Display Identity
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// =============================================================================

pub mod data;

pub use data::Data;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Display identity joined into messages, rosters and conversation lists.
/// The user records themselves are owned by the account service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: i64,
    pub nickname: String,
    pub avatar_url: Option<String>,
}

pub struct Service {
    pub db: &'static dyn Data,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("users::Service").finish()
    }
}

impl Service {
    pub async fn identity(&self, user_id: i64) -> Result<Option<UserIdentity>> {
        self.db.identity(user_id).await
    }

    pub async fn require_identity(&self, user_id: i64) -> Result<UserIdentity> {
        self.identity(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("unknown user {user_id}")))
    }
}
