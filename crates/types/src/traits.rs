//! Async traits shared across all tokenrelay crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `tokenrelay-types`, not on each other.

use crate::{AccessToken, error::Result};
use async_trait::async_trait;

/// A source of bearer tokens for a set of scopes.
///
/// Implementations perform the network (or process) call every time; caching
/// is the caller's job.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Obtain a fresh token for `scopes`.
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken>;
}
