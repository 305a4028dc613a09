//! Unified error type for the tokenrelay workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across tokenrelay crates.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The caller did not present the expected shared secret.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The identity provider failed to issue a token.
    #[error("token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// A credential source is not configured or cannot be used here.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// The upstream request could not be built (bad URL, method or header).
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RelayError>;
