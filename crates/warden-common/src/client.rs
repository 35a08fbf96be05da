use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use url::Url;

use crate::credentials::Credentials;
use crate::headers::AuthorizationHeaderSet;
use crate::{DEFAULT_CACHE_KEY, DEFAULT_STORE_DIR_NAME, DEFAULT_TIMEOUT_SECS};

/// Which backend holds cached tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    /// One entry file per cache key in a local directory.
    #[default]
    File,
    /// Process-local map; nothing survives a restart.
    Memory,
}

/// Backing store configuration.
///
/// # Examples
///
/// ```
/// use warden_common::{StoreBackendKind, StoreConfig};
///
/// let store = StoreConfig::default();
/// assert_eq!(store.backend, StoreBackendKind::File);
/// assert!(store.resolved_directory().ends_with("warden"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend kind (default: `file`).
    #[serde(default)]
    pub backend: StoreBackendKind,
    /// Directory for the file backend (default: `<temp dir>/warden`).
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl StoreConfig {
    /// A file-backed store rooted at `directory`.
    pub fn file(directory: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackendKind::File,
            directory: Some(directory.into()),
        }
    }

    /// An in-memory store.
    #[must_use]
    pub const fn memory() -> Self {
        Self {
            backend: StoreBackendKind::Memory,
            directory: None,
        }
    }

    /// The directory the file backend uses, applying the default.
    #[must_use]
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_STORE_DIR_NAME))
    }
}

/// Configuration for a credential manager.
///
/// Loadable from TOML:
///
/// ```
/// use warden_common::{ManagerConfig, StoreBackendKind};
///
/// let config: ManagerConfig = toml::from_str(r#"
///     base_url = "https://api.example.com"
///     certificate_path = "/etc/warden/client.pem"
///     private_key_path = "/etc/warden/client.key"
///     client_id = "svc-a"
///
///     [store]
///     backend = "memory"
/// "#)?;
///
/// assert_eq!(config.cache_key(), "warden-access-token");
/// assert_eq!(config.store.backend, StoreBackendKind::Memory);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Base URL of the API; the token endpoint is `<base_url>/token`.
    pub base_url: String,
    /// PEM-encoded client certificate.
    pub certificate_path: PathBuf,
    /// PEM-encoded private key.
    pub private_key_path: PathBuf,
    /// OAuth2 client identifier.
    pub client_id: String,
    /// Cache slot name (default: [`DEFAULT_CACHE_KEY`]).
    #[serde(default)]
    pub cache_key: Option<String>,
    /// Token exchange timeout in seconds (default: [`DEFAULT_TIMEOUT_SECS`]).
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Backing store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

impl ManagerConfig {
    /// Creates a configuration with default cache key, timeout, and store.
    pub fn new(
        base_url: impl Into<String>,
        certificate_path: impl Into<PathBuf>,
        private_key_path: impl Into<PathBuf>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            certificate_path: certificate_path.into(),
            private_key_path: private_key_path.into(),
            client_id: client_id.into(),
            cache_key: None,
            timeout_seconds: None,
            store: StoreConfig::default(),
        }
    }

    /// Sets the cache slot name.
    #[must_use]
    pub fn with_cache_key(mut self, cache_key: impl Into<String>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    /// Sets the token exchange timeout.
    #[must_use]
    pub const fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Sets the backing store.
    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Validated client credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate path, key path, or client id is empty.
    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        Credentials::new(
            self.certificate_path.clone(),
            self.private_key_path.clone(),
            self.client_id.clone(),
        )
    }

    /// The cache key, falling back to [`DEFAULT_CACHE_KEY`] when unset or blank.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        self.cache_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .unwrap_or(DEFAULT_CACHE_KEY)
    }

    /// The token exchange timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// The parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not `http`/`https`.
    pub fn parsed_base_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("invalid base_url '{}': {e}", self.base_url))?;

        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            );
        }

        Ok(url)
    }

    /// Validates every field that can be checked without I/O.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.credentials()?;
        self.parsed_base_url()?;

        if self.timeout_seconds == Some(0) {
            anyhow::bail!("timeout_seconds must be greater than zero");
        }

        Ok(())
    }
}

/// Parameters an HTTP client factory needs to build an authenticated client.
///
/// The client presents the certificate and key for mTLS and sends `headers`
/// on every request.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use url::Url;
/// use warden_common::{AuthorizationHeaderSet, ClientConfig, IdempotencyKey, Token};
///
/// let token = Token::new("abc", Utc::now());
/// let config = ClientConfig::builder()
///     .base_url(Url::parse("https://api.example.com")?)
///     .certificate_path("client.pem")
///     .private_key_path("client.key")
///     .headers(AuthorizationHeaderSet::new(IdempotencyKey::from("k"), &token))
///     .build();
///
/// assert_eq!(config.base_url.as_str(), "https://api.example.com/");
/// # Ok::<(), url::ParseError>(())
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct ClientConfig {
    /// Base URL for API calls.
    pub base_url: Url,
    /// PEM-encoded client certificate.
    #[builder(setter(into))]
    pub certificate_path: PathBuf,
    /// PEM-encoded private key.
    #[builder(setter(into))]
    pub private_key_path: PathBuf,
    /// Default headers for every request.
    pub headers: AuthorizationHeaderSet,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn sample() -> ManagerConfig {
        ManagerConfig::new("https://api.example.com", "cert.pem", "key.pem", "svc")
    }

    #[test]
    fn test_defaults() {
        let config = sample();
        assert_eq!(config.cache_key(), DEFAULT_CACHE_KEY);
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.store, StoreConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_cache_key_uses_default() {
        let config = sample().with_cache_key("   ");
        assert_eq!(config.cache_key(), DEFAULT_CACHE_KEY);

        let config = sample().with_cache_key("tenant-a");
        assert_eq!(config.cache_key(), "tenant-a");
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut config = sample();
        config.client_id = String::new();
        assert!(config.validate().is_err());

        let config = ManagerConfig::new("ftp://example.com", "cert.pem", "key.pem", "svc");
        assert!(config.validate().is_err());

        let config = ManagerConfig::new("not a url", "cert.pem", "key.pem", "svc");
        assert!(config.validate().is_err());

        let config = sample().with_timeout_seconds(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_full_toml() {
        let config: ManagerConfig = toml::from_str(
            r#"
base_url = "https://api.example.com/v2"
certificate_path = "/etc/warden/client.pem"
private_key_path = "/etc/warden/client.key"
client_id = "svc-a"
cache_key = "prod"
timeout_seconds = 10

[store]
backend = "file"
directory = "/var/cache/warden"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_key(), "prod");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.store, StoreConfig::file("/var/cache/warden"));
        assert_eq!(
            config.store.resolved_directory(),
            PathBuf::from("/var/cache/warden")
        );
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: Result<ManagerConfig, _> = toml::from_str(
            r#"
base_url = "https://api.example.com"
certificate_path = "c"
private_key_path = "k"
client_id = "id"

[store]
backend = "redis"
            "#,
        );
        assert!(result.is_err());
    }
}
