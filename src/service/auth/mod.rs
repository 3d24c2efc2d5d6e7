// =============================================================================
// FitPulse Social Fitness Backend - Token Validation
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Narrow interface over the external identity provider. The backend only
//   validates bearer credentials and resolves them to a user identity;
//   issuance, refresh and revocation live elsewhere.
//
// =============================================================================

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identity resolved from a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub nickname: String,
    pub email: String,
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    nickname: String,
    #[serde(default)]
    email: String,
    #[allow(dead_code)]
    exp: usize,
}

/// HS256 validator for tokens minted by the account service.
pub struct JwtValidator {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| Error::Authentication(format!("invalid token: {e}")))?;
        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| Error::Authentication("token subject is not a user id".to_owned()))?;
        Ok(AuthenticatedUser {
            user_id,
            nickname: data.claims.nickname,
            email: data.claims.email,
        })
    }
}

pub struct Service {
    validator: Box<dyn TokenValidator>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("auth::Service").finish()
    }
}

impl Service {
    pub fn jwt(secret: &str) -> Self {
        Self {
            validator: Box::new(JwtValidator::new(secret)),
        }
    }

    pub fn with_validator(validator: Box<dyn TokenValidator>) -> Self {
        Self { validator }
    }

    pub async fn validate(&self, token: &str) -> Result<AuthenticatedUser> {
        self.validator.validate(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn mint(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token encodes")
    }

    fn far_future() -> u64 {
        4102444800 // 2100-01-01
    }

    #[tokio::test]
    async fn test_valid_token_resolves_identity() {
        let auth = Service::jwt("s3cr3t");
        let token = mint(
            "s3cr3t",
            json!({"sub": "42", "nickname": "runner", "email": "r@example.com", "exp": far_future()}),
        );
        let user = auth.validate(&token).await.expect("valid token");
        assert_eq!(user.user_id, 42);
        assert_eq!(user.nickname, "runner");
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let auth = Service::jwt("s3cr3t");
        let token = mint(
            "other",
            json!({"sub": "42", "nickname": "runner", "exp": far_future()}),
        );
        let err = auth.validate(&token).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_non_numeric_subject_is_rejected() {
        let auth = Service::jwt("s3cr3t");
        let token = mint(
            "s3cr3t",
            json!({"sub": "not-a-number", "nickname": "x", "exp": far_future()}),
        );
        assert!(matches!(
            auth.validate(&token).await.unwrap_err(),
            Error::Authentication(_)
        ));
    }
}
