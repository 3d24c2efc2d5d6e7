use async_trait::async_trait;

use super::UserIdentity;
use crate::Result;

#[async_trait]
pub trait Data: Send + Sync {
    async fn identity(&self, user_id: i64) -> Result<Option<UserIdentity>>;
}
