use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::token::Token;

/// Header carrying the per-request idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
/// Header carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "Authorization";
/// Header declaring the request body type.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
/// Content type sent with authenticated API requests.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Idempotency key attached to a single outbound request.
///
/// Either supplied by the caller or freshly generated for each header set.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wraps an existing key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for IdempotencyKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Headers required by the downstream API on every authenticated request.
///
/// Derived from the currently held token and never stored. Header names and
/// casing are fixed: `Idempotency-Key`, `Authorization`, `Content-Type`.
#[derive(Clone)]
pub struct AuthorizationHeaderSet {
    idempotency_key: IdempotencyKey,
    authorization: SecretString,
    content_type: &'static str,
}

impl fmt::Debug for AuthorizationHeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationHeaderSet")
            .field("idempotency_key", &self.idempotency_key)
            .field("authorization", &"Bearer [REDACTED]")
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl AuthorizationHeaderSet {
    /// Builds the header set for `token`.
    #[must_use]
    pub fn new(idempotency_key: IdempotencyKey, token: &Token) -> Self {
        Self {
            idempotency_key,
            authorization: token.bearer(),
            content_type: JSON_CONTENT_TYPE,
        }
    }

    /// The `Idempotency-Key` value.
    #[must_use]
    pub const fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    /// The `Authorization` value, `Bearer <token>`.
    #[must_use]
    pub const fn authorization(&self) -> &SecretString {
        &self.authorization
    }

    /// The `Content-Type` value.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Header name/value pairs in wire form.
    ///
    /// The authorization value is exposed; keep the result out of logs.
    #[must_use]
    pub fn exposed_pairs(&self) -> [(&'static str, &str); 3] {
        [
            (IDEMPOTENCY_KEY_HEADER, self.idempotency_key.as_str()),
            (AUTHORIZATION_HEADER, self.authorization.expose_secret()),
            (CONTENT_TYPE_HEADER, self.content_type),
        ]
    }
}
