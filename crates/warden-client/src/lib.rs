//! # warden-client
//!
//! Token acquisition for APIs that authenticate clients with mutual TLS.
//!
//! This crate performs the OAuth2 `client_credentials` exchange through the
//! [`TokenAcquirer`] trait and ships the reqwest-based [`MtlsTokenAcquirer`].
//! It also turns a [`ClientConfig`](warden_common::ClientConfig) into an
//! authenticated HTTP client for subsequent API calls.
//!
//! ## Example
//!
//! ```no_run
//! use url::Url;
//! use warden_client::{MtlsTokenAcquirer, TokenAcquirer};
//! use warden_common::Credentials;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let acquirer = MtlsTokenAcquirer::new(&Url::parse("https://api.example.com")?);
//! let credentials = Credentials::new("client.pem", "client.key", "svc-a")?;
//!
//! let fetched = acquirer.fetch(&credentials).await?;
//! println!("expires in {:?}", fetched.ttl);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use warden_common::{Credentials, FetchedToken};

pub mod error;
pub mod http;
pub mod mtls;

pub use error::AcquireError;
pub use http::{AuthenticatedClient, build_client, header_map};
pub use mtls::{MtlsTokenAcquirer, parse_token_response};

/// Trait for token exchange implementations.
///
/// One call is one exchange with the authorization server. Implementations
/// must not cache or retry; both concerns belong to the caller.
#[async_trait]
pub trait TokenAcquirer: Send + Sync {
    /// Exchange `credentials` for a fresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The certificate or key cannot be loaded
    /// - Network communication fails or times out
    /// - The server answers with a non-200 status
    /// - The response is not JSON or carries no `access_token`
    async fn fetch(&self, credentials: &Credentials) -> Result<FetchedToken, AcquireError>;
}
