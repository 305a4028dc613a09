//! API error type that maps [`RelayError`] variants to HTTP status codes.
//!
//! Bodies are short plain-text messages. Credential details never reach the
//! client; the handler logs them before converting.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokenrelay_types::RelayError;

/// Wrapper around [`RelayError`] that implements [`IntoResponse`].
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl ApiError {
    /// Returns `(status, message)` for the wrapped error.
    fn classify(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            RelayError::Auth(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            RelayError::TokenAcquisition(_) | RelayError::CredentialUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "token acquisition failed",
            ),
            RelayError::InvalidRequest(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "bad upstream request")
            }
            RelayError::Http(_) => (StatusCode::BAD_GATEWAY, "upstream error"),
            RelayError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = self.classify();
        (
            status,
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                ),
                (
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ),
            ],
            format!("{msg}\n"),
        )
            .into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}
