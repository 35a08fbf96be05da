//! The credential manager: one entry point that always hands out a live token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use url::Url;

use warden_client::{AuthenticatedClient, MtlsTokenAcquirer, TokenAcquirer, build_client};
use warden_common::{
    AuthorizationHeaderSet, ClientConfig, Credentials, FetchedToken, IdempotencyKey,
    ManagerConfig, StoreBackendKind, Token,
};

use crate::clock::Clock;
use crate::error::{CredentialError, Result};
use crate::idgen::{IdGenerator, UuidGenerator};
use crate::store::{FileBackend, MemoryBackend, TokenBackend, TokenStore};

/// Hands out non-expired access tokens and the headers built from them.
///
/// Tokens are fetched through a [`TokenAcquirer`] and cached in a
/// [`TokenStore`] under the manager's cache key. The manager also keeps the
/// most recent token in memory so repeated calls do not touch the backend
/// while it is live.
pub struct CredentialManager {
    credentials: Credentials,
    cache_key: String,
    base_url: Url,
    timeout: Duration,
    store: TokenStore,
    acquirer: Arc<dyn TokenAcquirer>,
    id_generator: Arc<dyn IdGenerator>,
    current: RwLock<Option<Token>>,
    loaded: AtomicBool,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("client_id", &self.credentials.client_id())
            .field("cache_key", &self.cache_key)
            .field("base_url", &self.base_url.as_str())
            .field("loaded", &self.loaded.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    /// Validates `config`, prepares the token store, and loads the first token.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Configuration`] for invalid input (no network
    /// call is made), [`CredentialError::StoreInitialization`] if the store
    /// directory cannot be prepared, and any error from the first token load.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use warden::{CredentialManager, ManagerConfig};
    ///
    /// # async fn example() -> warden::error::Result<()> {
    /// let config = ManagerConfig::new(
    ///     "https://api.example.com",
    ///     "/etc/warden/client.pem",
    ///     "/etc/warden/client.key",
    ///     "svc-a",
    /// );
    /// let manager = CredentialManager::initialize(config).await?;
    ///
    /// let headers = manager.authorization_headers(None).await?;
    /// println!("idempotency key: {}", headers.idempotency_key());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn initialize(config: ManagerConfig) -> Result<Self> {
        Self::builder(config).initialize().await
    }

    /// Starts a builder for injecting the acquirer, backend, clock, or id
    /// generator.
    #[must_use]
    pub fn builder(config: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder::new(config)
    }

    /// Returns a live access token, fetching one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a required fetch fails.
    pub async fn token(&self) -> Result<SecretString> {
        Ok(self.live_token().await?.value().clone())
    }

    /// Builds the request headers for one API call.
    ///
    /// Uses `idempotency_key` when given, otherwise a freshly generated one.
    /// An expired held token is refreshed first.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingToken`] if no token has been loaded
    /// yet, or any error from refreshing an expired token.
    pub async fn authorization_headers(
        &self,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<AuthorizationHeaderSet> {
        if !self.loaded.load(Ordering::Acquire) {
            return Err(CredentialError::MissingToken);
        }

        let token = self.live_token().await?;
        let idempotency_key =
            idempotency_key.unwrap_or_else(|| IdempotencyKey::new(self.id_generator.generate()));

        Ok(AuthorizationHeaderSet::new(idempotency_key, &token))
    }

    /// Bundles everything an HTTP client factory needs for an authenticated
    /// client. Does not construct the client.
    ///
    /// # Errors
    ///
    /// Same as [`authorization_headers`](Self::authorization_headers).
    pub async fn client_config(
        &self,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<ClientConfig> {
        let headers = self.authorization_headers(idempotency_key).await?;

        Ok(ClientConfig::builder()
            .base_url(self.base_url.clone())
            .certificate_path(self.credentials.certificate_path().to_path_buf())
            .private_key_path(self.credentials.private_key_path().to_path_buf())
            .headers(headers)
            .build())
    }

    /// Builds an HTTP client that presents the client certificate and sends
    /// the authorization headers on every request.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::ClientBuild`] if the identity or headers
    /// are rejected, or any error from [`client_config`](Self::client_config).
    pub async fn authenticated_client(
        &self,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<AuthenticatedClient> {
        let config = self.client_config(idempotency_key).await?;

        build_client(&config, self.timeout)
            .await
            .map_err(CredentialError::ClientBuild)
    }

    /// Drops the held token and the cached entry so the next call fetches.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot remove the entry.
    #[instrument(skip(self), fields(cache_key = %self.cache_key))]
    pub async fn invalidate(&self) -> Result<()> {
        *self.current.write().await = None;
        self.store.invalidate(&self.cache_key).await?;

        info!("Cached token invalidated");
        Ok(())
    }

    /// The validated client credentials.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The cache slot this manager reads and writes.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Base URL for API calls.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[instrument(skip(self), fields(cache_key = %self.cache_key))]
    async fn live_token(&self) -> Result<Token> {
        {
            let now = self.store.clock().now();
            let held = self.current.read().await;
            if let Some(token) = held.as_ref().filter(|token| token.is_live_at(now)) {
                return Ok(token.clone());
            }
        }

        let token = self
            .store
            .get_or_compute(&self.cache_key, || self.fetch())
            .await?;

        *self.current.write().await = Some(token.clone());
        self.loaded.store(true, Ordering::Release);
        Ok(token)
    }

    async fn fetch(&self) -> Result<FetchedToken> {
        info!(
            client_id = self.credentials.client_id(),
            "Fetching new access token"
        );

        match self.acquirer.fetch(&self.credentials).await {
            Ok(fetched) => {
                info!(ttl_secs = fetched.ttl.as_secs(), "Access token acquired");
                Ok(fetched)
            }
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "Token acquisition failed");
                Err(e.into())
            }
        }
    }
}

/// Builder for [`CredentialManager`] with injectable collaborators.
///
/// Anything not set falls back to what the configuration describes: the
/// mTLS acquirer for `base_url`, the configured store backend, the system
/// clock, and UUID idempotency keys.
#[must_use]
pub struct ManagerBuilder {
    config: ManagerConfig,
    acquirer: Option<Arc<dyn TokenAcquirer>>,
    backend: Option<Arc<dyn TokenBackend>>,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

impl std::fmt::Debug for ManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerBuilder")
            .field("config", &self.config)
            .field("custom_acquirer", &self.acquirer.is_some())
            .field("custom_backend", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

impl ManagerBuilder {
    fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            acquirer: None,
            backend: None,
            clock: None,
            id_generator: None,
        }
    }

    /// Uses `acquirer` instead of the mTLS token endpoint.
    pub fn with_acquirer(mut self, acquirer: Arc<dyn TokenAcquirer>) -> Self {
        self.acquirer = Some(acquirer);
        self
    }

    /// Uses `backend` instead of the configured store.
    pub fn with_backend(mut self, backend: Arc<dyn TokenBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Uses `clock` for token expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses `id_generator` for idempotency keys.
    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Builds the manager without loading a token.
    ///
    /// Header requests fail with [`CredentialError::MissingToken`] until
    /// [`CredentialManager::token`] has succeeded once.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Configuration`] for invalid input and
    /// [`CredentialError::StoreInitialization`] if the store directory cannot
    /// be prepared.
    pub fn build_deferred(self) -> Result<CredentialManager> {
        let config = self.config;

        config
            .validate()
            .map_err(|e| CredentialError::Configuration(format!("{e:#}")))?;
        let credentials = config
            .credentials()
            .map_err(|e| CredentialError::Configuration(format!("{e:#}")))?;
        let base_url = config
            .parsed_base_url()
            .map_err(|e| CredentialError::Configuration(format!("{e:#}")))?;
        let timeout = config.timeout();

        let backend = match self.backend {
            Some(backend) => backend,
            None => open_backend(&config)?,
        };
        let mut store = TokenStore::new(backend);
        if let Some(clock) = self.clock {
            store = store.with_clock(clock);
        }

        let acquirer = self.acquirer.unwrap_or_else(|| {
            Arc::new(MtlsTokenAcquirer::new(&base_url).with_timeout(timeout))
        });

        Ok(CredentialManager {
            credentials,
            cache_key: config.cache_key().to_string(),
            base_url,
            timeout,
            store,
            acquirer,
            id_generator: self.id_generator.unwrap_or_else(|| Arc::new(UuidGenerator)),
            current: RwLock::new(None),
            loaded: AtomicBool::new(false),
        })
    }

    /// Builds the manager and loads the first token.
    ///
    /// # Errors
    ///
    /// Everything [`build_deferred`](Self::build_deferred) returns, plus any
    /// store or acquisition error from the first load.
    pub async fn initialize(self) -> Result<CredentialManager> {
        let manager = self.build_deferred()?;
        manager.token().await?;

        info!(
            client_id = manager.credentials.client_id(),
            cache_key = %manager.cache_key,
            "Credential manager initialized"
        );
        Ok(manager)
    }
}

fn open_backend(config: &ManagerConfig) -> Result<Arc<dyn TokenBackend>> {
    match config.store.backend {
        StoreBackendKind::File => {
            let directory = config.store.resolved_directory();
            let backend = FileBackend::open(&directory).map_err(|source| {
                CredentialError::StoreInitialization {
                    path: directory.clone(),
                    source,
                }
            })?;
            Ok(Arc::new(backend))
        }
        StoreBackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use async_trait::async_trait;
    use warden_client::AcquireError;

    use super::*;

    struct StaticAcquirer;

    #[async_trait]
    impl TokenAcquirer for StaticAcquirer {
        async fn fetch(
            &self,
            _credentials: &Credentials,
        ) -> std::result::Result<FetchedToken, AcquireError> {
            Ok(FetchedToken::new("secret-token", Duration::from_secs(60)))
        }
    }

    fn builder() -> ManagerBuilder {
        let config = ManagerConfig::new("https://api.example.com", "c.pem", "k.pem", "svc")
            .with_store(warden_common::StoreConfig::memory());
        CredentialManager::builder(config).with_acquirer(Arc::new(StaticAcquirer))
    }

    #[tokio::test]
    async fn test_debug_never_prints_token() {
        let manager = builder().initialize().await.unwrap();
        let debug = format!("{manager:?}");

        assert!(debug.contains("svc"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_configuration_error_names_field() {
        let config = ManagerConfig::new("https://api.example.com", "", "k.pem", "svc");
        let err = CredentialManager::builder(config)
            .build_deferred()
            .unwrap_err();

        assert!(matches!(err, CredentialError::Configuration(_)));
        assert!(err.to_string().contains("certificate"));
    }
}
