//! # warden-common
//!
//! Common types for managing OAuth2 client-credentials tokens obtained over
//! mutual TLS.
//!
//! This crate provides the data model shared by the rest of the workspace:
//! - Client credentials (certificate, private key, client id)
//! - Cached bearer tokens with expiry
//! - Authorization header sets and HTTP client configuration bundles
//! - Serializable manager and store configuration
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use chrono::Utc;
//! use warden_common::{AuthorizationHeaderSet, FetchedToken, IdempotencyKey};
//!
//! let token = FetchedToken::new("abc123", Duration::from_secs(120)).issue_at(Utc::now());
//! let headers = AuthorizationHeaderSet::new(IdempotencyKey::from("req-1"), &token);
//!
//! assert_eq!(headers.idempotency_key().as_str(), "req-1");
//! assert_eq!(headers.content_type(), "application/json");
//! ```

/// Manager, store, and HTTP client configuration.
///
/// Contains the TOML-loadable [`ManagerConfig`] and the [`ClientConfig`]
/// bundle handed to HTTP client factories.
pub mod client;
/// Client credentials used for the mTLS token exchange.
pub mod credentials;
/// Produced request headers and idempotency keys.
pub mod headers;
/// Bearer tokens and their expiry.
pub mod token;

pub use client::{ClientConfig, ManagerConfig, StoreBackendKind, StoreConfig};
pub use credentials::Credentials;
pub use headers::{AuthorizationHeaderSet, IdempotencyKey};
pub use token::{FetchedToken, Token};

use std::time::Duration;

/// Cache slot used when the caller does not name one.
pub const DEFAULT_CACHE_KEY: &str = "warden-access-token";

/// Token lifetime assumed when the authorization server omits `expires_in`.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Network timeout for the token exchange, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Directory name used under the system temp dir for the file store.
pub const DEFAULT_STORE_DIR_NAME: &str = "warden";
