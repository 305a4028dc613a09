use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokenrelay_types::{RelayError, error::Result};
use url::Url;

/// Scope requested from the identity provider when none is configured.
pub const DEFAULT_SCOPE: &str = "https://cognitiveservices.azure.com/.default";
/// Listen port when none is configured.
pub const DEFAULT_PORT: u16 = 8081;
/// Listen address when none is configured (all interfaces).
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Environment variable holding the upstream base URL.
const ENV_TARGET_URL: &str = "TARGET_URL";
/// Environment variable holding the shared secret callers must present.
const ENV_EXPECTED_KEY: &str = "EXPECTED_KEY";
/// Environment variable holding the identity scope.
const ENV_SCOPE: &str = "AZURE_OPENAI_SCOPE";
const ENV_PORT: &str = "PORT";
const ENV_HOST: &str = "HOST";

/// Unvalidated settings as figment extracts them.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default)]
    upstream: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default = "default_scope")]
    scope: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_host")]
    host: String,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            upstream: None,
            api_key: None,
            scope: default_scope(),
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Environment values layered on top of the file. Unset and empty variables
/// are skipped so they never mask a file value.
#[derive(Debug, Default, Serialize)]
struct EnvOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
}

impl EnvOverrides {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let port = get(ENV_PORT)
            .map(|p| {
                p.parse::<u16>()
                    .map_err(|e| RelayError::Config(format!("{ENV_PORT}: {e}")))
            })
            .transpose()?;
        Ok(Self {
            upstream: get(ENV_TARGET_URL),
            api_key: get(ENV_EXPECTED_KEY),
            scope: get(ENV_SCOPE),
            port,
            host: get(ENV_HOST),
        })
    }
}

/// Process-wide proxy configuration. Immutable once loaded.
#[derive(Debug)]
pub struct Config {
    /// Base URL every request is forwarded to.
    pub upstream: Url,
    /// Shared secret callers must present in `api-key` or `x-api-key`.
    /// `None` disables caller authentication.
    pub api_key: Option<SecretString>,
    /// Scope passed to the identity provider.
    pub scope: String,
    /// Listen port (defaults to 8081).
    pub port: u16,
    /// Listen address (defaults to `0.0.0.0`).
    pub host: String,
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the
    /// process environment, in increasing precedence.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the file is missing or malformed, or
    /// if the upstream URL is absent or unparseable.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Same as [`Config::load`] with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };

        let mut figment = Figment::from(Serialized::defaults(RawConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(RelayError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "loading configuration file");
            figment = figment.merge(Yaml::file(path));
        }
        let figment = figment.merge(Serialized::defaults(EnvOverrides::from_lookup(lookup)?));

        let raw: RawConfig = figment
            .extract()
            .map_err(|e| RelayError::Config(e.to_string()))?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self> {
        let target = raw
            .upstream
            .filter(|u| !u.is_empty())
            .ok_or_else(|| RelayError::Config(format!("{ENV_TARGET_URL} not set")))?;
        let upstream = Url::parse(&target)
            .map_err(|e| RelayError::Config(format!("{ENV_TARGET_URL}: {e}")))?;
        if !matches!(upstream.scheme(), "http" | "https") || upstream.cannot_be_a_base() {
            return Err(RelayError::Config(format!(
                "{ENV_TARGET_URL}: unsupported upstream URL {upstream}"
            )));
        }

        let scope = if raw.scope.is_empty() {
            default_scope()
        } else {
            raw.scope
        };

        Ok(Self {
            upstream,
            api_key: raw
                .api_key
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            scope,
            port: raw.port,
            host: raw.host,
        })
    }

    /// `host:port` string to bind the listener on.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
