// =============================================================================
// FitPulse Social Fitness Backend - Error Types
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Crate-wide error taxonomy. Domain failures surface to the originating
//   caller as a structured {code, message} payload; infrastructure failures
//   are absorbed at the component boundary and never reach clients.
//
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// FitPulse global error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Authorization(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    BadConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// FitPulse global result type
pub type Result<T> = std::result::Result<T, Error>;

/// Wire form of an error, emitted to the originating connection only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl Error {
    pub fn bad_config(message: &str) -> Self {
        Self::BadConfig(message.to_owned())
    }

    /// Stable machine-readable code for the gateway wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "AUTH_FAILED",
            Error::Authorization(_) => "FORBIDDEN",
            Error::Validation(_) => "INVALID_PAYLOAD",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::Database(_) | Error::BadConfig(_) | Error::Internal(_) | Error::Io(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::Authorization(_) => StatusCode::FORBIDDEN,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Database(_) | Error::BadConfig(_) | Error::Internal(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Structured payload for the caller. Internal details never leak; the
    /// full error is logged at the handler boundary instead.
    pub fn to_wire(&self) -> ErrorPayload {
        let message = match self {
            Error::Authentication(m)
            | Error::Authorization(m)
            | Error::Validation(m)
            | Error::NotFound(m)
            | Error::Conflict(m) => m.clone(),
            _ => "internal server error".to_owned(),
        };
        ErrorPayload {
            code: self.code().to_owned(),
            message,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (self.status(), Json(self.to_wire())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_keep_their_message() {
        let error = Error::Authorization("not a room participant".to_owned());
        let wire = error.to_wire();
        assert_eq!(wire.code, "FORBIDDEN");
        assert_eq!(wire.message, "not a room participant");
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_infrastructure_errors_are_masked() {
        let error = Error::Internal("redis connection refused".to_owned());
        let wire = error.to_wire();
        assert_eq!(wire.code, "INTERNAL_ERROR");
        assert_eq!(wire.message, "internal server error");
    }

    #[test]
    fn test_validation_maps_to_bad_request() {
        let error = Error::Validation("message body must not be empty".to_owned());
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn test_conflict_maps_to_conflict() {
        let error = Error::Conflict("challenge room is full".to_owned());
        assert_eq!(error.status(), StatusCode::CONFLICT);
        assert_eq!(error.code(), "CONFLICT");
    }
}
