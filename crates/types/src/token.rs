//! Access token representation and expiry logic.

use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// A bearer token issued by an identity provider, with its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: SystemTime,
}

impl AccessToken {
    /// Create a token expiring at the given instant.
    pub fn new(token: impl Into<String>, expires_on: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// Create a token expiring `lifetime` from now.
    pub fn expiring_in(token: impl Into<String>, lifetime: Duration) -> Self {
        Self::new(token, SystemTime::now() + lifetime)
    }

    /// Create a token from a unix timestamp in seconds, as returned by
    /// managed identity endpoints and the Azure CLI.
    pub fn from_unix_secs(token: impl Into<String>, expires_on: u64) -> Self {
        Self::new(token, UNIX_EPOCH + Duration::from_secs(expires_on))
    }

    /// Return `true` if the token is still usable at `now`, treating it as
    /// expired `margin` before its nominal expiry.
    #[must_use]
    pub fn is_fresh_at(&self, now: SystemTime, margin: Duration) -> bool {
        self.expires_on
            .checked_sub(margin)
            .is_some_and(|deadline| now < deadline)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[redacted]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}
