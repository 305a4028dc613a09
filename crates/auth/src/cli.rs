//! Developer credential backed by the Azure CLI (`az login`).

use async_trait::async_trait;
use serde::Deserialize;
use tokenrelay_types::{AccessToken, RelayError, TokenCredential, error::Result};

use crate::entra::Lenient;

const NAME: &str = "AzureCliCredential";

#[cfg(windows)]
const AZ_PROGRAM: &str = "az.cmd";
#[cfg(not(windows))]
const AZ_PROGRAM: &str = "az";

/// Output of `az account get-access-token --output json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    /// Unix seconds; present since CLI 2.54. The older `expiresOn` field is a
    /// local-time string without zone and is not used.
    #[serde(rename = "expires_on")]
    expires_on: Option<Lenient>,
}

/// Runs `az account get-access-token` for every fetch.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureCliCredential {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: AZ_PROGRAM.to_string(),
        }
    }

    /// Use a different executable (a wrapper script, or a fake in tests).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

/// Parses the CLI's JSON output into a token.
fn parse_output(stdout: &[u8]) -> Result<AccessToken> {
    let parsed: CliTokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| RelayError::TokenAcquisition(format!("invalid az output: {e}")))?;
    let expires_on = parsed.expires_on.ok_or_else(|| {
        RelayError::TokenAcquisition("az output lacks expires_on; upgrade the Azure CLI".into())
    })?;
    Ok(AccessToken::from_unix_secs(
        parsed.access_token,
        expires_on.as_u64()?,
    ))
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let [scope] = scopes else {
            return Err(RelayError::CredentialUnavailable(format!(
                "{NAME} requires exactly one scope, got {}",
                scopes.len()
            )));
        };

        let output = tokio::process::Command::new(&self.program)
            .args(["account", "get-access-token", "--output", "json", "--scope"])
            .arg(scope)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RelayError::CredentialUnavailable(format!("{NAME}: cannot run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RelayError::TokenAcquisition(format!(
                "{NAME}: {}",
                stderr.trim()
            )));
        }
        parse_output(&output.stdout)
    }
}
