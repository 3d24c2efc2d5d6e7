use async_trait::async_trait;
use sqlx::Row;

use super::PostgresDb;
use crate::service::users::{Data, UserIdentity};
use crate::Result;

#[async_trait]
impl Data for PostgresDb {
    async fn identity(&self, user_id: i64) -> Result<Option<UserIdentity>> {
        let row = sqlx::query("SELECT id, nickname, avatar_url FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(UserIdentity {
                user_id: row.try_get("id")?,
                nickname: row.try_get("nickname")?,
                avatar_url: row.try_get("avatar_url")?,
            })),
            None => Ok(None),
        }
    }
}
