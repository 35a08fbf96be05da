use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};

/// A token value freshly returned by the authorization server.
///
/// Carries the lifetime the server granted rather than an absolute expiry;
/// the store stamps it with an expiry at the moment it is cached.
#[derive(Clone)]
pub struct FetchedToken {
    /// The bearer token value.
    pub value: SecretString,
    /// How long the token stays valid from the moment it is stored.
    pub ttl: Duration,
}

impl fmt::Debug for FetchedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedToken")
            .field("value", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl FetchedToken {
    /// Creates a fetched token with the given lifetime.
    pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: SecretString::from(value.into()),
            ttl,
        }
    }

    /// Converts into a cached [`Token`] expiring `ttl` after `issued_at`.
    ///
    /// Lifetimes too large to represent saturate at the maximum timestamp.
    #[must_use]
    pub fn issue_at(self, issued_at: DateTime<Utc>) -> Token {
        let expires_at = TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|delta| issued_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Token {
            value: self.value,
            expires_at,
        }
    }
}

/// A bearer token together with its absolute expiry.
///
/// The value is held as a [`SecretString`] and never appears in `Debug`
/// output.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, Utc};
/// use secrecy::ExposeSecret;
/// use warden_common::Token;
///
/// let now = Utc::now();
/// let token = Token::new("abc", now + TimeDelta::seconds(60));
///
/// assert!(token.is_live_at(now));
/// assert!(!token.is_live_at(now + TimeDelta::seconds(60)));
/// assert_eq!(token.value().expose_secret(), "abc");
/// ```
#[derive(Clone)]
pub struct Token {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// Creates a token that expires at the given instant.
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_at,
        }
    }

    /// The secret token value.
    #[must_use]
    pub const fn value(&self) -> &SecretString {
        &self.value
    }

    /// The instant at which the token stops being valid.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is still valid at `now`.
    ///
    /// The expiry instant itself counts as expired.
    #[must_use]
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Remaining lifetime at `now`, or zero once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Formats the value as an `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> SecretString {
        SecretString::from(format!("Bearer {}", self.value.expose_secret()))
    }
}
