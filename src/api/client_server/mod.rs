// =============================================================================
// FitPulse Social Fitness Backend - REST Read Paths
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   HTTP endpoints for clients without an open gateway connection:
//   paginated history, date-range export, presence snapshots, conversation
//   lists and admission. All endpoints require the same bearer credential
//   the gateways validate.
//
// =============================================================================

pub mod conversations;
pub mod messages;
pub mod participants;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::service::auth::AuthenticatedUser;
use crate::{services, Error};

/// Bearer-authenticated caller identity.
pub struct AuthUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| Error::Authentication("missing bearer credential".to_owned()))?;
        Ok(AuthUser(services().auth.validate(token).await?))
    }
}
