//! Workload identity federation (Kubernetes projected service account token).

use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use tokenrelay_types::{AccessToken, RelayError, TokenCredential, error::Result};

use crate::entra;

const ENV_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
const NAME: &str = "WorkloadIdentityCredential";
const ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Exchanges a federated token file for an Entra ID access token.
///
/// The file is re-read on every fetch because the kubelet rotates it.
#[derive(Debug)]
pub struct WorkloadIdentityCredential {
    http: Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    token_file: PathBuf,
}

impl WorkloadIdentityCredential {
    pub fn new(
        http: Client,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http,
            authority: entra::DEFAULT_AUTHORITY.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            token_file: token_file.into(),
        }
    }

    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds the credential from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_FEDERATED_TOKEN_FILE`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::CredentialUnavailable`] if a required variable is unset.
    pub fn from_lookup(http: Client, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let tenant_id = entra::required(&lookup, entra::ENV_TENANT_ID, NAME)?;
        let client_id = entra::required(&lookup, entra::ENV_CLIENT_ID, NAME)?;
        let token_file = entra::required(&lookup, ENV_FEDERATED_TOKEN_FILE, NAME)?;
        Ok(Self::new(http, tenant_id, client_id, token_file)
            .with_authority(entra::authority_from(&lookup)))
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let assertion = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                RelayError::TokenAcquisition(format!(
                    "cannot read {}: {e}",
                    self.token_file.display()
                ))
            })?;
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_assertion_type", ASSERTION_TYPE),
            ("client_assertion", assertion.trim()),
            ("scope", scope.as_str()),
        ];
        entra::request_token(&self.http, &self.authority, &self.tenant_id, &form).await
    }
}
