//! Catch-all forwarding handler.
//!
//! Per request: check the shared secret, strip it, acquire a bearer token,
//! rewrite the target URL, swap `Authorization`, send, and relay the upstream
//! response as a stream. Any failure ends the request; nothing is retried.
//!
//! Client disconnects drop the handler future (or the response body), which
//! drops the in-flight upstream request or response stream with it.

use axum::{
    body::{Body, HttpBody as _},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};
use futures_util::TryStreamExt as _;
use secrecy::{ExposeSecret as _, SecretString};
use std::{net::SocketAddr, sync::Arc};
use tokenrelay_types::RelayError;

use crate::{
    AppState,
    error::ApiError,
    rewrite::{copy_headers, upstream_url},
};

/// Header slots a caller may use to present the shared secret.
pub(crate) const CLIENT_KEY_HEADERS: &[&str] = &["api-key", "x-api-key"];

/// Checks the shared secret against both key headers. Passes when no secret
/// is configured.
fn authenticate(expected: Option<&SecretString>, headers: &HeaderMap) -> Result<(), RelayError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let expected = expected.expose_secret().as_bytes();
    let matched = CLIENT_KEY_HEADERS.iter().any(|name| {
        headers
            .get(*name)
            .is_some_and(|value| value.as_bytes() == expected)
    });
    if matched {
        Ok(())
    } else {
        Err(RelayError::Auth("missing or invalid api key".into()))
    }
}

/// Removes the shared-secret headers so they never reach the upstream.
fn strip_client_keys(headers: &mut HeaderMap) {
    for name in CLIENT_KEY_HEADERS {
        headers.remove(*name);
    }
}

/// Headers for the upstream request: the filtered inbound set plus the
/// injected bearer token.
fn outbound_headers(inbound: &HeaderMap, token: &str) -> Result<HeaderMap, RelayError> {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    copy_headers(inbound, &mut headers);
    let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| RelayError::InvalidRequest(format!("token is not a valid header: {e}")))?;
    bearer.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, bearer);
    Ok(headers)
}

/// Handles every inbound request regardless of method or path.
///
/// # Errors
///
/// Returns [`ApiError`] with 401 on a bad shared secret, 500 when no token can
/// be obtained or the upstream request cannot be built, and 502 when the
/// upstream is unreachable. Upstream error statuses are relayed, not mapped.
pub async fn forward(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, ApiError> {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    tracing::info!(
        method = %req.method(),
        uri = %req.uri(),
        remote = ?remote,
        "proxy request"
    );

    let (mut parts, body) = req.into_parts();

    authenticate(state.config.api_key.as_ref(), &parts.headers)?;
    strip_client_keys(&mut parts.headers);

    let token = state
        .tokens
        .acquire(state.credential.as_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "token acquisition failed");
            ApiError(RelayError::TokenAcquisition(e.to_string()))
        })?;

    let url = upstream_url(&state.config.upstream, parts.uri.path(), parts.uri.query());
    let headers = outbound_headers(&parts.headers, &token).inspect_err(|e| {
        tracing::error!(error = %e, "bad upstream request");
    })?;

    let mut upstream = state
        .http
        .request(parts.method, url.clone())
        .headers(headers);
    if body.size_hint().exact() != Some(0) {
        upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let resp = upstream.send().await.map_err(|e| {
        tracing::error!(url = %url, error = %e, "upstream error");
        ApiError(RelayError::Http(e.to_string()))
    })?;

    let status = resp.status();
    tracing::debug!(url = %url, status = status.as_u16(), "upstream responded");

    let mut response_headers = HeaderMap::with_capacity(resp.headers().len());
    copy_headers(resp.headers(), &mut response_headers);

    let stream = resp.bytes_stream().inspect_err(|e| {
        tracing::warn!(error = %e, "upstream body interrupted");
    });
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_authenticate_without_secret_passes() {
        assert!(authenticate(None, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_authenticate_either_slot() {
        let s = secret("S");
        assert!(authenticate(Some(&s), &headers(&[("api-key", "S")])).is_ok());
        assert!(authenticate(Some(&s), &headers(&[("x-api-key", "S")])).is_ok());
        assert!(
            authenticate(Some(&s), &headers(&[("api-key", "wrong"), ("x-api-key", "S")])).is_ok()
        );
    }

    #[test]
    fn test_authenticate_rejects() {
        let s = secret("S");
        for h in [
            headers(&[]),
            headers(&[("api-key", "s")]),
            headers(&[("x-api-key", "S ")]),
            headers(&[("authorization", "S")]),
        ] {
            assert!(matches!(
                authenticate(Some(&s), &h),
                Err(RelayError::Auth(_))
            ));
        }
    }

    #[test]
    fn test_strip_client_keys() {
        let mut h = headers(&[("api-key", "a"), ("x-api-key", "b"), ("accept", "*/*")]);
        strip_client_keys(&mut h);
        assert!(h.get("api-key").is_none());
        assert!(h.get("x-api-key").is_none());
        assert_eq!(h.get("accept").unwrap(), "*/*");
    }

    #[test]
    fn test_outbound_headers_inject_bearer() {
        let h = headers(&[
            ("authorization", "Bearer from-client"),
            ("host", "proxy.local"),
            ("content-type", "application/json"),
        ]);
        let out = outbound_headers(&h, "tok").unwrap();
        assert_eq!(out.get_all("authorization").iter().count(), 1);
        assert_eq!(out.get("authorization").unwrap(), "Bearer tok");
        assert!(out.get("authorization").unwrap().is_sensitive());
        assert!(out.get("host").is_none());
        assert_eq!(out.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_outbound_headers_rejects_bad_token() {
        let err = outbound_headers(&HeaderMap::new(), "bad\ntoken").unwrap_err();
        assert!(matches!(err, RelayError::InvalidRequest(_)));
    }
}
