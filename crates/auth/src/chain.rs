//! Ordered credential chain, the equivalent of the Azure SDKs'
//! `DefaultAzureCredential`.
use async_trait::async_trait;
use reqwest::Client;
use tokenrelay_types::{AccessToken, RelayError, TokenCredential, error::Result};

use crate::{
    AzureCliCredential, EnvironmentCredential, ManagedIdentityCredential,
    WorkloadIdentityCredential,
};

/// Tries each source in order and returns the first token issued.
pub struct DefaultAzureCredential {
    sources: Vec<(&'static str, Box<dyn TokenCredential>)>,
}

impl DefaultAzureCredential {
    /// Builds a chain from explicit sources.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::CredentialUnavailable`] if `sources` is empty.
    pub fn new(sources: Vec<(&'static str, Box<dyn TokenCredential>)>) -> Result<Self> {
        if sources.is_empty() {
            return Err(RelayError::CredentialUnavailable(
                "no credential sources configured".into(),
            ));
        }
        Ok(Self { sources })
    }

    /// Builds the standard chain from the process environment.
    ///
    /// # Errors
    ///
    /// See [`DefaultAzureCredential::from_lookup`].
    pub fn from_env(http: Client) -> Result<Self> {
        Self::from_lookup(http, |name| std::env::var(name).ok())
    }

    /// Builds the standard chain: environment service principal, workload
    /// identity, managed identity, Azure CLI. Sources whose variables are
    /// missing are left out.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::CredentialUnavailable`] if no source could be built.
    pub fn from_lookup(http: Client, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut sources: Vec<(&'static str, Box<dyn TokenCredential>)> = Vec::new();

        match EnvironmentCredential::from_lookup(http.clone(), &lookup) {
            Ok(cred) => sources.push(("environment", Box::new(cred))),
            Err(e) => tracing::debug!(reason = %e, "skipping environment credential"),
        }
        match WorkloadIdentityCredential::from_lookup(http.clone(), &lookup) {
            Ok(cred) => sources.push(("workload_identity", Box::new(cred))),
            Err(e) => tracing::debug!(reason = %e, "skipping workload identity credential"),
        }
        sources.push((
            "managed_identity",
            Box::new(ManagedIdentityCredential::from_lookup(http, &lookup)),
        ));
        sources.push(("azure_cli", Box::new(AzureCliCredential::new())));

        Self::new(sources)
    }

    /// Names of the sources in the order they are tried.
    #[must_use]
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|(name, _)| *name).collect()
    }
}

#[async_trait]
impl TokenCredential for DefaultAzureCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let mut failures = Vec::with_capacity(self.sources.len());
        for (name, source) in &self.sources {
            match source.get_token(scopes).await {
                Ok(token) => {
                    tracing::debug!(source = name, "credential issued token");
                    return Ok(token);
                }
                Err(e) => {
                    tracing::debug!(source = name, error = %e, "credential source failed");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }
        Err(RelayError::TokenAcquisition(format!(
            "all credential sources failed: {}",
            failures.join("; ")
        )))
    }
}
