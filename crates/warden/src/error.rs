use std::path::PathBuf;

use thiserror::Error;
use warden_client::AcquireError;

/// Errors raised by token store backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend location could not be read or written.
    #[error("Failed to access token entry {}: {source}", path.display())]
    Io {
        /// Entry or directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stored entry exists but cannot be decoded.
    #[error("Corrupt token entry {}: {source}", path.display())]
    Corrupt {
        /// The unreadable entry.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Any other backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by [`CredentialManager`](crate::CredentialManager).
///
/// The variant names the stage that failed: configuration, store
/// preparation, store access, token acquisition, or header construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CredentialError {
    /// Invalid constructor input. Not retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The backing store location could not be prepared.
    #[error("Failed to prepare token store at {}: {source}", path.display())]
    StoreInitialization {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing store failed while reading or writing a token.
    #[error("Token store error: {0}")]
    Store(#[from] StoreError),

    /// The token exchange failed.
    #[error("Token acquisition failed: {0}")]
    Acquisition(#[from] AcquireError),

    /// An authenticated HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] AcquireError),

    /// Headers were requested before any token was loaded.
    #[error("No token is held; load one with token() before requesting headers")]
    MissingToken,
}

impl CredentialError {
    /// Check if retrying the failed call may succeed.
    ///
    /// Only transport failures during acquisition qualify.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Acquisition(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The underlying acquisition error, if the exchange failed.
    #[must_use]
    pub const fn acquire_error(&self) -> Option<&AcquireError> {
        match self {
            Self::Acquisition(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias using `CredentialError`.
pub type Result<T> = std::result::Result<T, CredentialError>;
