//! Error types for the token exchange.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while exchanging client credentials for a token.
///
/// Each variant identifies the stage that failed, from reading the client
/// certificate through parsing the authorization server's response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AcquireError {
    /// Network or HTTP transport failure, including timeouts.
    ///
    /// Indicates issues like DNS resolution, TLS handshake, or connection
    /// failures. These errors are typically retryable.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authorization server answered with a non-200 status.
    ///
    /// Usually requires a credential or configuration fix before retrying.
    #[error("Authorization server returned {status}: {body}")]
    AuthServer {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("Failed to parse token response: {source}")]
    ResponseParse {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
        /// Raw response body.
        body: String,
    },

    /// The response was JSON but carried no string `access_token`.
    #[error("Token response has no access_token: {body}")]
    MissingTokenInResponse {
        /// Raw response body, kept for diagnostics.
        body: String,
    },

    /// A certificate or key file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Certificate {
        /// The file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The certificate and key were read but rejected as a TLS identity.
    #[error("Invalid client identity: {0}")]
    Identity(#[source] reqwest::Error),

    /// Invalid endpoint URL or HTTP client settings.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AcquireError {
    /// Check if this error is potentially retryable.
    ///
    /// Returns `true` only for transport failures; every other variant needs
    /// a configuration, credential, or server-side fix.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if the transport failure was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// The HTTP status if the authorization server rejected the request.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::AuthServer { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The raw response body, when one was received.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::AuthServer { body, .. }
            | Self::ResponseParse { body, .. }
            | Self::MissingTokenInResponse { body } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_auth_server_accessors() {
        let err = AcquireError::AuthServer {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.body(), Some("boom"));
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Authorization server returned 500: boom");
    }

    #[test]
    fn test_parse_error_keeps_body() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = AcquireError::ResponseParse {
            source,
            body: "{".to_string(),
        };
        assert_eq!(err.body(), Some("{"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_certificate_error_names_path() {
        let err = AcquireError::Certificate {
            path: PathBuf::from("/missing/client.pem"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/missing/client.pem"));
        assert!(!err.is_retryable());
    }
}
