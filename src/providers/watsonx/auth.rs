use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::types::IdentityTokenResponse;
use crate::auth::{AccessToken, TokenProvider};
use crate::config::TokenCachePolicy;
use crate::Error;

/// Grant type for exchanging an API key at the identity service.
pub const API_KEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Cached tokens are dropped this long before the issuer says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CachedToken {
    token: AccessToken,
    valid_until: Instant,
}

/// Exchanges an API key for a bearer token at the IAM identity endpoint.
pub struct IamTokenProvider {
    client: Client,
    token_url: String,
    api_key: String,
    timeout: Duration,
    policy: TokenCachePolicy,
    cached: Mutex<Option<CachedToken>>,
}

impl IamTokenProvider {
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        policy: TokenCachePolicy,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            api_key: api_key.into(),
            timeout,
            policy,
            cached: Mutex::new(None),
        }
    }

    /// Perform one API key exchange. Empty keys yield no token.
    pub async fn acquire_token(&self) -> Result<Option<AccessToken>, Error> {
        if self.api_key.is_empty() {
            return Ok(None);
        }

        tracing::debug!(url = %self.token_url, "exchanging API key for access token");

        let response = self
            .client
            .post(&self.token_url)
            .timeout(self.timeout)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", API_KEY_GRANT_TYPE),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::auth(format!("identity request timed out after {:?}", self.timeout))
                } else {
                    Error::auth(format!("identity request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "identity service returned HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let body: IdentityTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("invalid identity response: {e}")))?;

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::auth("identity response has no access_token"))?;

        let mut token = AccessToken::new(access_token);
        if let Some(expires_in) = body.expires_in {
            token = token.with_expires_in(Duration::from_secs(expires_in));
        }
        Ok(Some(token))
    }

    fn cache_lifetime(&self, token: &AccessToken) -> Option<Duration> {
        let TokenCachePolicy::Ttl(ttl) = self.policy else {
            return None;
        };
        let lifetime = match token.expires_in() {
            Some(expires_in) => ttl.min(expires_in.saturating_sub(EXPIRY_MARGIN)),
            None => ttl,
        };
        (!lifetime.is_zero()).then_some(lifetime)
    }
}

#[async_trait::async_trait]
impl TokenProvider for IamTokenProvider {
    async fn token(&self) -> Result<Option<AccessToken>, Error> {
        if self.policy == TokenCachePolicy::PerCall {
            return self.acquire_token().await;
        }

        // Held across the exchange so concurrent callers share one fetch.
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.valid_until {
                return Ok(Some(entry.token.clone()));
            }
        }
        *cached = None;

        let token = self.acquire_token().await?;
        if let Some(token) = &token {
            if let Some(lifetime) = self.cache_lifetime(token) {
                *cached = Some(CachedToken {
                    token: token.clone(),
                    valid_until: Instant::now() + lifetime,
                });
            }
        }
        Ok(token)
    }
}
