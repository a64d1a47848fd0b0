/*
 * Responsibility
 * - Errors the OAuth2 gate can end a request with
 * - IntoResponse (HTTP status / JSON error body)
 * - Chain errors pass through with the status the chain chose
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::oauth2::chain::ChainError;
use crate::services::oauth2::credential::BodyError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    /// No chain factory was registered for the application.
    #[error("the OAuth2 component was not configured for this application")]
    Configuration,

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Body(#[from] BodyError),
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            GateError::Chain(err) => err.status(),
            GateError::Body(BodyError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::Body(BodyError::Unreadable(_)) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GateError::Configuration => "OAUTH2_NOT_CONFIGURED",
            GateError::Chain(err) => err.code(),
            GateError::Body(BodyError::TooLarge { .. }) => "PAYLOAD_TOO_LARGE",
            GateError::Body(BodyError::Unreadable(_)) => "INVALID_REQUEST",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new(self.code(), self.to_string());
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_errors_keep_their_status() {
        assert_eq!(
            GateError::from(ChainError::ExpiredToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GateError::from(ChainError::InsufficientScope("write".into())).code(),
            "INSUFFICIENT_SCOPE"
        );
    }

    #[test]
    fn configuration_error_is_a_server_error() {
        let res = GateError::Configuration.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn oversized_body_is_413() {
        let err = GateError::from(BodyError::TooLarge { limit: 10 });
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
