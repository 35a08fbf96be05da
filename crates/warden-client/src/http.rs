//! HTTP client construction for mTLS + bearer-token API calls.
//!
//! Loads the PEM client identity, converts an [`AuthorizationHeaderSet`] into
//! default request headers, and produces an [`AuthenticatedClient`] from a
//! [`ClientConfig`].

use std::path::Path;
use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Identity, Method, RequestBuilder};
use url::Url;

use warden_common::{AuthorizationHeaderSet, ClientConfig};

use crate::error::AcquireError;

/// Reads the certificate and key PEM files into a TLS client identity.
///
/// The files are read on every call so that rotated certificates are picked
/// up without restarting.
///
/// # Errors
///
/// Returns [`AcquireError::Certificate`] if either file cannot be read and
/// [`AcquireError::Identity`] if the PEM content is rejected.
pub async fn load_identity(
    certificate_path: &Path,
    private_key_path: &Path,
) -> Result<Identity, AcquireError> {
    let mut pem = read_pem(certificate_path).await?;
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    pem.extend(read_pem(private_key_path).await?);

    Identity::from_pem(&pem).map_err(AcquireError::Identity)
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, AcquireError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| AcquireError::Certificate {
            path: path.to_path_buf(),
            source,
        })
}

/// Converts a header set into a `HeaderMap`.
///
/// The `Authorization` value is flagged as sensitive so HTTP-level debug
/// output does not print it.
///
/// # Errors
///
/// Returns [`AcquireError::Configuration`] if a value contains characters
/// not allowed in HTTP headers.
pub fn header_map(headers: &AuthorizationHeaderSet) -> Result<HeaderMap, AcquireError> {
    let mut map = HeaderMap::with_capacity(3);

    for (name, value) in headers.exposed_pairs() {
        let mut header_value = HeaderValue::from_str(value).map_err(|_| {
            AcquireError::Configuration(format!("invalid value for header {name}"))
        })?;
        if name == warden_common::headers::AUTHORIZATION_HEADER {
            header_value.set_sensitive(true);
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AcquireError::Configuration(format!("invalid header name {name}")))?;
        map.insert(header_name, header_value);
    }

    Ok(map)
}

/// An HTTP client that presents the client certificate and sends the
/// authorization headers on every request.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    client: reqwest::Client,
    base_url: Url,
}

impl AuthenticatedClient {
    /// The base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying reqwest client.
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Starts a request to `path` relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Resolves `path` against the base URL, keeping any base path prefix.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Builds an [`AuthenticatedClient`] from a configuration bundle.
///
/// # Errors
///
/// Returns an error if the identity cannot be loaded, a header value is
/// invalid, or the HTTP client cannot be constructed.
pub async fn build_client(
    config: &ClientConfig,
    timeout: Duration,
) -> Result<AuthenticatedClient, AcquireError> {
    let identity = load_identity(&config.certificate_path, &config.private_key_path).await?;
    let headers = header_map(&config.headers)?;

    let client = reqwest::Client::builder()
        .identity(identity)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(AcquireError::Identity)?;

    debug!(
        "Built authenticated client for {} (idempotency key {})",
        config.base_url,
        config.headers.idempotency_key()
    );

    Ok(AuthenticatedClient {
        client,
        base_url: config.base_url.clone(),
    })
}
