//! Shared pieces of the Entra ID token endpoints.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokenrelay_types::{AccessToken, RelayError, error::Result};

/// Public-cloud authority used when `AZURE_AUTHORITY_HOST` is unset.
pub(crate) const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

pub(crate) const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
pub(crate) const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub(crate) const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

/// Suffix Entra v2 scopes carry; v1-style resources omit it.
const DEFAULT_SUFFIX: &str = "/.default";

/// Response body of `/oauth2/v2.0/token`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Lenient,
}

/// Identity endpoints disagree on whether numbers are quoted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Lenient {
    Num(u64),
    Str(String),
}

impl Lenient {
    pub(crate) fn as_u64(&self) -> Result<u64> {
        match self {
            Self::Num(n) => Ok(*n),
            Self::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| RelayError::TokenAcquisition(format!("invalid expiry value: {s}"))),
        }
    }
}

/// Reads the authority host from the environment, without a trailing slash.
pub(crate) fn authority_from(lookup: &impl Fn(&str) -> Option<String>) -> String {
    lookup(ENV_AUTHORITY_HOST)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Reads a required variable, reporting which credential needed it.
pub(crate) fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    credential: &str,
) -> Result<String> {
    lookup(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::CredentialUnavailable(format!("{credential}: {name} not set")))
}

/// Converts a single v2 scope into the v1 resource managed identity expects.
pub(crate) fn scope_to_resource<'a>(scopes: &'a [String], credential: &str) -> Result<&'a str> {
    match scopes {
        [scope] => Ok(scope.strip_suffix(DEFAULT_SUFFIX).unwrap_or(scope)),
        _ => Err(RelayError::CredentialUnavailable(format!(
            "{credential} requires exactly one scope, got {}",
            scopes.len()
        ))),
    }
}

/// Posts a client-credentials style form to the tenant's v2 token endpoint.
pub(crate) async fn request_token(
    http: &Client,
    authority: &str,
    tenant_id: &str,
    form: &[(&str, &str)],
) -> Result<AccessToken> {
    let url = format!("{authority}/{tenant_id}/oauth2/v2.0/token");
    let resp = http
        .post(&url)
        .form(form)
        .send()
        .await
        .map_err(|e| RelayError::TokenAcquisition(format!("token request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RelayError::TokenAcquisition(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let parsed: TokenResponse = resp
        .json()
        .await
        .map_err(|e| RelayError::TokenAcquisition(format!("invalid token response: {e}")))?;
    Ok(AccessToken::expiring_in(
        parsed.access_token,
        Duration::from_secs(parsed.expires_in.as_u64()?),
    ))
}
