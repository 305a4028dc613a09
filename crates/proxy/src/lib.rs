//! HTTP proxy layer: axum router, the catch-all forwarding handler, and error
//! mapping.
//!
//! Every method and path is forwarded to the configured upstream with the
//! caller's shared secret removed and a fresh bearer token injected.

mod error;
mod forward;
pub mod rewrite;

pub use error::ApiError;

use axum::Router;
use std::sync::Arc;
use tokenrelay_auth::TokenCache;
use tokenrelay_config::Config;
use tokenrelay_types::TokenCredential;
use tower_http::trace::TraceLayer;

/// Shared application state passed to the handler.
pub struct AppState {
    /// Immutable process configuration.
    pub config: Arc<Config>,
    /// Cached upstream bearer token.
    pub tokens: TokenCache,
    /// Source of fresh tokens when the cache is stale.
    pub credential: Arc<dyn TokenCredential>,
    /// HTTP client for upstream requests.
    pub http: reqwest::Client,
}

impl AppState {
    /// Creates the shared state with an empty token cache for the configured
    /// scope.
    pub fn new(
        config: Arc<Config>,
        credential: Arc<dyn TokenCredential>,
        http: reqwest::Client,
    ) -> Arc<Self> {
        let tokens = TokenCache::new(config.scope.clone());
        Arc::new(Self {
            config,
            tokens,
            credential,
            http,
        })
    }
}

/// Build the HTTP client used for upstream requests.
///
/// Redirects are relayed to the caller rather than followed, and bodies are
/// never decompressed.
///
/// # Errors
///
/// Returns the builder error if the TLS backend cannot be initialised.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Build the axum router. There are no routes: every request lands in the
/// forwarding fallback.
pub fn make_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(forward::forward)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
