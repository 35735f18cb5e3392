//! Bearer token sources.

use crate::Error;
use std::fmt;
use std::time::Duration;

/// A short-lived bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_in: Option<Duration>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_in: None,
        }
    }

    /// Attach the lifetime reported by the issuer.
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Lifetime reported by the issuer at the time the token was minted.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Keep tokens out of logs and panic messages.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Something that can hand out a bearer token for the next request.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get a token, or `None` when requests should go out unauthenticated.
    async fn token(&self) -> Result<Option<AccessToken>, Error>;
}

/// A token issued out of band and used verbatim.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<Option<AccessToken>, Error> {
        Ok(Some(self.token.clone()))
    }
}
