//! Core types and traits for the tokenrelay workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! proxy: the error type, the access token representation, and the credential
//! trait that identity sources implement.

pub mod error;
pub mod token;
pub mod traits;

pub use error::RelayError;
pub use token::AccessToken;
pub use traits::TokenCredential;
