//! # warden
//!
//! Cached, single-flight OAuth2 client-credentials tokens for APIs that
//! authenticate clients with mutual TLS.
//!
//! A [`CredentialManager`] exchanges a client certificate, private key, and
//! client id for an access token, caches it in a [`TokenStore`] until it
//! expires, and builds the request headers and client configuration every
//! API call needs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use warden::{CredentialManager, IdempotencyKey, ManagerConfig, StoreConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ManagerConfig::new(
//!     "https://api.example.com",
//!     "/etc/warden/client.pem",
//!     "/etc/warden/client.key",
//!     "svc-a",
//! )
//! .with_store(StoreConfig::file("/var/cache/warden"));
//!
//! let manager = CredentialManager::initialize(config).await?;
//!
//! let client = manager
//!     .authenticated_client(Some(IdempotencyKey::from("order-42")))
//!     .await?;
//! let response = client.http().post(client.url("orders")).send().await?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Single-flight refresh**: concurrent callers on a cold cache share one fetch
//! - **Pluggable storage**: in-memory or on-disk backends via [`TokenBackend`]
//! - **Testable time**: inject a [`clock::ManualClock`] to simulate expiry
//! - **Redacted secrets**: token values never appear in `Debug` output or logs

pub mod clock;
pub mod error;
pub mod idgen;
pub mod manager;
pub mod store;

pub use warden_client::*;
pub use warden_common::*;

pub use error::{CredentialError, StoreError};
pub use manager::{CredentialManager, ManagerBuilder};
pub use store::{FileBackend, MemoryBackend, TokenBackend, TokenStore};
