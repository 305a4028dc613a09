//! Single-slot token cache shared by every in-flight request.
//!
//! Responsibilities:
//! - Serve the cached token while it is outside the expiry margin.
//! - Fetch and store a replacement otherwise (whole-value swap, last writer wins).
//! - Keep the previous token when a refresh fails.
//!
//! Concurrent refreshes are not deduplicated: a burst of requests that all see
//! a stale token each call the credential once.
use arc_swap::ArcSwapOption;
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokenrelay_types::{AccessToken, TokenCredential, error::Result};

/// A token is treated as expired this long before its nominal expiry.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Holds at most one bearer token for a fixed scope and refreshes it on
/// demand through a [`TokenCredential`].
pub struct TokenCache {
    slot: ArcSwapOption<AccessToken>,
    scopes: Vec<String>,
    margin: Duration,
}

impl TokenCache {
    /// Creates an empty cache that requests tokens for `scope`.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            scopes: vec![scope.into()],
            margin: EXPIRY_MARGIN,
        }
    }

    /// Override the expiry margin.
    #[must_use]
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// Return a valid token, refreshing through `credential` if needed.
    ///
    /// # Errors
    ///
    /// Returns the credential's error if a refresh was needed and failed.
    pub async fn acquire(&self, credential: &dyn TokenCredential) -> Result<String> {
        self.acquire_at(credential, SystemTime::now()).await
    }

    /// Same as [`TokenCache::acquire`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns the credential's error if a refresh was needed and failed.
    pub async fn acquire_at(
        &self,
        credential: &dyn TokenCredential,
        now: SystemTime,
    ) -> Result<String> {
        if let Some(cached) = self.slot.load_full()
            && cached.is_fresh_at(now, self.margin)
        {
            return Ok(cached.token.clone());
        }

        match credential.get_token(&self.scopes).await {
            Ok(fresh) => {
                tracing::debug!(expires_on = ?fresh.expires_on, "cached new access token");
                let value = fresh.token.clone();
                self.slot.store(Some(Arc::new(fresh)));
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                Err(e)
            }
        }
    }

    /// Returns the currently cached token, fresh or not.
    #[must_use]
    pub fn peek(&self) -> Option<Arc<AccessToken>> {
        self.slot.load_full()
    }

    /// Drops the cached token so the next `acquire` refreshes.
    pub fn invalidate(&self) {
        self.slot.store(None);
    }
}
