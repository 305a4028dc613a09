//! Service principal credential configured through `AZURE_*` variables.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret as _, SecretString};
use tokenrelay_types::{AccessToken, TokenCredential, error::Result};

use crate::entra;

const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
const NAME: &str = "EnvironmentCredential";

/// Client-secret grant against the tenant's token endpoint.
#[derive(Debug)]
pub struct EnvironmentCredential {
    http: Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
}

impl EnvironmentCredential {
    pub fn new(
        http: Client,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            http,
            authority: entra::DEFAULT_AUTHORITY.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Point the credential at a different authority host.
    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds the credential from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`,
    /// `AZURE_CLIENT_SECRET` and optionally `AZURE_AUTHORITY_HOST`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::CredentialUnavailable`] if a required variable is unset.
    ///
    /// [`RelayError::CredentialUnavailable`]: tokenrelay_types::RelayError::CredentialUnavailable
    pub fn from_lookup(http: Client, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let tenant_id = entra::required(&lookup, entra::ENV_TENANT_ID, NAME)?;
        let client_id = entra::required(&lookup, entra::ENV_CLIENT_ID, NAME)?;
        let secret = entra::required(&lookup, ENV_CLIENT_SECRET, NAME)?;
        Ok(Self::new(http, tenant_id, client_id, SecretString::from(secret))
            .with_authority(entra::authority_from(&lookup)))
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", scope.as_str()),
        ];
        entra::request_token(&self.http, &self.authority, &self.tenant_id, &form).await
    }
}
