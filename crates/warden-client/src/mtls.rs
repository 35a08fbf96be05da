//! Client-credentials exchange authenticated by a TLS client certificate.
//!
//! Performs `POST <base_url>/token` with a form-encoded
//! `grant_type=client_credentials&client_id=<id>` body over a connection that
//! presents the caller's certificate and key. No bearer token or client
//! secret is involved.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use url::Url;

use warden_common::{Credentials, DEFAULT_TIMEOUT_SECS, DEFAULT_TOKEN_TTL, FetchedToken};

use crate::TokenAcquirer;
use crate::error::AcquireError;
use crate::http::load_identity;

/// Content type of the token request body.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Path of the token endpoint relative to the base URL.
pub const TOKEN_PATH: &str = "token";

/// Token acquirer that speaks the `client_credentials` grant over mTLS.
///
/// Each [`fetch`](TokenAcquirer::fetch) performs exactly one HTTP round trip.
/// Nothing is cached and nothing is retried here; caching belongs to the
/// token store and retry policy to the caller.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use url::Url;
/// use warden_client::{MtlsTokenAcquirer, TokenAcquirer};
/// use warden_common::Credentials;
///
/// # async fn example() -> anyhow::Result<()> {
/// let acquirer = MtlsTokenAcquirer::new(&Url::parse("https://api.example.com")?)
///     .with_timeout(Duration::from_secs(10));
/// let credentials = Credentials::new("client.pem", "client.key", "svc-a")?;
///
/// let token = acquirer.fetch(&credentials).await?;
/// println!("token valid for {:?}", token.ttl);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MtlsTokenAcquirer {
    token_url: String,
    timeout: Duration,
}

impl MtlsTokenAcquirer {
    /// Creates an acquirer for the token endpoint under `base_url`.
    ///
    /// Any path on the base URL is kept: `https://host/v2` yields
    /// `https://host/v2/token`.
    #[must_use]
    pub fn new(base_url: &Url) -> Self {
        Self {
            token_url: format!("{}/{TOKEN_PATH}", base_url.as_str().trim_end_matches('/')),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the network timeout for the exchange.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The full token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    async fn http_client(&self, credentials: &Credentials) -> Result<reqwest::Client, AcquireError> {
        let identity =
            load_identity(credentials.certificate_path(), credentials.private_key_path()).await?;

        reqwest::Client::builder()
            .identity(identity)
            .timeout(self.timeout)
            .build()
            .map_err(AcquireError::Identity)
    }
}

#[async_trait]
impl TokenAcquirer for MtlsTokenAcquirer {
    async fn fetch(&self, credentials: &Credentials) -> Result<FetchedToken, AcquireError> {
        let client = self.http_client(credentials).await?;

        debug!(
            "Requesting token from {} for client {}",
            self.token_url,
            credentials.client_id()
        );

        let response = client
            .post(&self.token_url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            error!(
                "Token request failed with status {}: {}",
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            );
            return Err(AcquireError::AuthServer {
                status: status.as_u16(),
                body,
            });
        }

        let token = parse_token_response(&body)?;
        debug!("Received token valid for {}s", token.ttl.as_secs());

        Ok(token)
    }
}

/// Parses a token endpoint response body.
///
/// `access_token` must be a non-empty string. `expires_in` is honored when it
/// is a positive number of seconds (numeric strings included); anything else
/// falls back to [`DEFAULT_TOKEN_TTL`].
///
/// # Errors
///
/// Returns [`AcquireError::ResponseParse`] for malformed JSON and
/// [`AcquireError::MissingTokenInResponse`] when there is no usable
/// `access_token`.
pub fn parse_token_response(body: &str) -> Result<FetchedToken, AcquireError> {
    let json: Value = serde_json::from_str(body).map_err(|source| AcquireError::ResponseParse {
        source,
        body: body.to_string(),
    })?;

    let Some(access_token) = json
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
    else {
        return Err(AcquireError::MissingTokenInResponse {
            body: body.to_string(),
        });
    };

    let ttl = json
        .get("expires_in")
        .and_then(expires_in_seconds)
        .map_or(DEFAULT_TOKEN_TTL, Duration::from_secs);

    Ok(FetchedToken::new(access_token, ttl))
}

fn expires_in_seconds(value: &Value) -> Option<u64> {
    let seconds = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    seconds.filter(|s| *s > 0)
}
