//! Managed identity for Azure-hosted workloads.
//!
//! Two endpoint flavours exist:
//! - App Service / Functions / Container Apps expose `IDENTITY_ENDPOINT` and
//!   `IDENTITY_HEADER`.
//! - VMs, VM scale sets and AKS nodes use the Instance Metadata Service.
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tokenrelay_types::{AccessToken, RelayError, TokenCredential, error::Result};

use crate::entra::{self, Lenient};

/// Azure Instance Metadata Service token endpoint.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
/// IMDS is link-local; off Azure the connect hangs instead of failing.
const IMDS_TIMEOUT: Duration = Duration::from_secs(5);

const ENV_IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
const ENV_IDENTITY_HEADER: &str = "IDENTITY_HEADER";
const NAME: &str = "ManagedIdentityCredential";

#[derive(Debug)]
enum Endpoint {
    Imds { url: String },
    AppService { url: String, header: SecretString },
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityResponse {
    access_token: String,
    expires_on: Lenient,
}

/// Token from the host's managed identity endpoint, system or user assigned.
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    http: Client,
    endpoint: Endpoint,
    /// Client ID of a user-assigned identity; `None` selects the system identity.
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    /// System-assigned identity through IMDS.
    pub fn imds(http: Client) -> Self {
        Self {
            http,
            endpoint: Endpoint::Imds {
                url: IMDS_ENDPOINT.to_string(),
            },
            client_id: None,
        }
    }

    /// Identity through an App Service style endpoint.
    pub fn app_service(http: Client, url: impl Into<String>, header: SecretString) -> Self {
        Self {
            http,
            endpoint: Endpoint::AppService {
                url: url.into(),
                header,
            },
            client_id: None,
        }
    }

    /// Select a user-assigned identity.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Override the IMDS URL. Has no effect on App Service endpoints.
    #[must_use]
    pub fn with_imds_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        if let Endpoint::Imds { url } = &mut self.endpoint {
            *url = endpoint.into();
        }
        self
    }

    /// Picks the App Service endpoint when `IDENTITY_ENDPOINT` and
    /// `IDENTITY_HEADER` are both set, IMDS otherwise. `AZURE_CLIENT_ID`
    /// selects a user-assigned identity.
    pub fn from_lookup(http: Client, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let cred = match (get(ENV_IDENTITY_ENDPOINT), get(ENV_IDENTITY_HEADER)) {
            (Some(url), Some(header)) => Self::app_service(http, url, SecretString::from(header)),
            _ => Self::imds(http),
        };
        match get(entra::ENV_CLIENT_ID) {
            Some(client_id) => cred.with_client_id(client_id),
            None => cred,
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let resource = entra::scope_to_resource(scopes, NAME)?;

        let builder = match &self.endpoint {
            Endpoint::Imds { url } => self
                .http
                .get(url)
                .query(&[("api-version", IMDS_API_VERSION), ("resource", resource)])
                .header("Metadata", "true")
                .timeout(IMDS_TIMEOUT),
            Endpoint::AppService { url, header } => self
                .http
                .get(url)
                .query(&[("api-version", APP_SERVICE_API_VERSION), ("resource", resource)])
                .header("X-IDENTITY-HEADER", header.expose_secret()),
        };
        let builder = match &self.client_id {
            Some(client_id) => builder.query(&[("client_id", client_id.as_str())]),
            None => builder,
        };

        let resp = builder.send().await.map_err(|e| {
            RelayError::TokenAcquisition(format!("managed identity endpoint unreachable: {e}"))
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::TokenAcquisition(format!(
                "managed identity endpoint returned {status}: {body}"
            )));
        }

        let parsed: ManagedIdentityResponse = resp.json().await.map_err(|e| {
            RelayError::TokenAcquisition(format!("invalid managed identity response: {e}"))
        })?;
        Ok(AccessToken::from_unix_secs(
            parsed.access_token,
            parsed.expires_on.as_u64()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    const SCOPE: &str = "https://cognitiveservices.azure.com/.default";

    #[test]
    fn test_from_lookup_defaults_to_imds() {
        let cred = ManagedIdentityCredential::from_lookup(Client::new(), |_: &str| None);
        assert!(matches!(cred.endpoint, Endpoint::Imds { .. }));
        assert!(cred.client_id.is_none());
    }

    #[test]
    fn test_from_lookup_app_service() {
        let cred = ManagedIdentityCredential::from_lookup(Client::new(), |k: &str| match k {
            "IDENTITY_ENDPOINT" => Some("http://127.0.0.1:41741/msi/token".to_string()),
            "IDENTITY_HEADER" => Some("h".to_string()),
            "AZURE_CLIENT_ID" => Some("uami".to_string()),
            _ => None,
        });
        assert!(matches!(cred.endpoint, Endpoint::AppService { .. }));
        assert_eq!(cred.client_id.as_deref(), Some("uami"));
    }

    #[tokio::test]
    async fn test_imds_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("api-version", "2018-02-01"))
            .and(query_param("resource", "https://cognitiveservices.azure.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "mi-token",
                "expires_on": "1900000000",
                "resource": "https://cognitiveservices.azure.com",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cred = ManagedIdentityCredential::imds(Client::new())
            .with_imds_endpoint(format!("{}/metadata/identity/oauth2/token", server.uri()));
        let token = cred.get_token(&[SCOPE.to_string()]).await.unwrap();
        assert_eq!(token.token, "mi-token");
        assert_eq!(
            token.expires_on.duration_since(UNIX_EPOCH).unwrap().as_secs(),
            1_900_000_000
        );
    }

    #[tokio::test]
    async fn test_app_service_user_assigned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(header("X-IDENTITY-HEADER", "secret-header"))
            .and(query_param("api-version", "2019-08-01"))
            .and(query_param("client_id", "uami"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "as-token",
                "expires_on": 1_900_000_000u64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cred = ManagedIdentityCredential::app_service(
            Client::new(),
            format!("{}/msi/token", server.uri()),
            SecretString::from("secret-header".to_string()),
        )
        .with_client_id("uami");
        let token = cred.get_token(&[SCOPE.to_string()]).await.unwrap();
        assert_eq!(token.token, "as-token");
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("identity not found"))
            .mount(&server)
            .await;

        let cred = ManagedIdentityCredential::imds(Client::new()).with_imds_endpoint(server.uri());
        let err = cred.get_token(&[SCOPE.to_string()]).await.unwrap_err();
        assert!(matches!(err, RelayError::TokenAcquisition(_)));
        assert!(err.to_string().contains("identity not found"));
    }

    #[tokio::test]
    async fn test_rejects_multiple_scopes() {
        let cred = ManagedIdentityCredential::imds(Client::new());
        let err = cred
            .get_token(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::CredentialUnavailable(_)));
    }
}
