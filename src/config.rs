//! Provider configuration.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

/// Default identity service used for API key exchange.
pub const DEFAULT_IDENTITY_URL: &str = "https://iam.cloud.ibm.com";
/// API version date sent as the `version` query parameter.
pub const DEFAULT_API_VERSION: &str = "2023-05-29";
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 900;
pub const DEFAULT_REPETITION_PENALTY: f32 = 1.05;

/// Where generation requests are billed and scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    /// Sent as `project_id`.
    Project(String),
    /// Sent as `space_id`.
    Space(String),
}

/// How the client authenticates against the generation endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum WatsonxAuth {
    /// Exchange a long-lived API key for a bearer token at the identity service.
    ApiKey(String),
    /// Use an already issued bearer token as is.
    AccessToken(String),
    /// Send no Authorization header.
    None,
}

// Credentials never show up in logs or panic messages.
impl fmt::Debug for WatsonxAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatsonxAuth::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<redacted>").finish(),
            WatsonxAuth::AccessToken(_) => {
                f.debug_tuple("AccessToken").field(&"<redacted>").finish()
            }
            WatsonxAuth::None => f.write_str("None"),
        }
    }
}

/// Whether bearer tokens obtained from an API key are reused across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenCachePolicy {
    /// Fetch a fresh token for every call.
    #[default]
    PerCall,
    /// Reuse a token for at most this long, and never past the lifetime
    /// reported by the identity service minus a safety margin.
    Ttl(Duration),
}

/// Decoding strategy requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodingMethod {
    #[default]
    Greedy,
    Sample,
}

/// Configuration for a [`crate::WatsonxProvider`].
#[derive(Debug, Clone)]
pub struct WatsonxConfig {
    /// Base URL of the cluster, e.g. `https://us-south.ml.cloud.ibm.com`.
    pub cluster_url: String,
    pub deployment: Deployment,
    pub auth: WatsonxAuth,
    pub identity_url: String,
    pub api_version: String,
    /// Use the `generation_stream` endpoint instead of the buffered `generation` one.
    pub streaming: bool,
    /// Optional system turn prepended once to every prompt.
    pub system_preamble: Option<String>,
    pub decoding_method: DecodingMethod,
    pub repetition_penalty: f32,
    /// Used when a request does not set `max_tokens`.
    pub default_max_new_tokens: u32,
    pub token_cache: TokenCachePolicy,
    pub connect_timeout: Duration,
    /// Bound on the whole identity exchange.
    pub token_timeout: Duration,
    /// Longest wait for the response headers, and then for each next chunk
    /// of the response body.
    pub read_timeout: Duration,
}

impl WatsonxConfig {
    /// Create a configuration with defaults and no authentication.
    pub fn new(cluster_url: impl Into<String>, deployment: Deployment) -> Self {
        Self {
            cluster_url: cluster_url.into(),
            deployment,
            auth: WatsonxAuth::None,
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            streaming: true,
            system_preamble: None,
            decoding_method: DecodingMethod::default(),
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
            default_max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            token_cache: TokenCachePolicy::default(),
            connect_timeout: Duration::from_secs(10),
            token_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
        }
    }

    /// Authenticate with an API key. An empty key disables authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.auth = if api_key.is_empty() {
            WatsonxAuth::None
        } else {
            WatsonxAuth::ApiKey(api_key)
        };
        self
    }

    /// Authenticate with a pre-issued bearer token. An empty token disables
    /// authentication.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.auth = if token.is_empty() {
            WatsonxAuth::None
        } else {
            WatsonxAuth::AccessToken(token)
        };
        self
    }

    pub fn with_identity_url(mut self, identity_url: impl Into<String>) -> Self {
        self.identity_url = identity_url.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_system_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.system_preamble = Some(preamble.into());
        self
    }

    pub fn with_decoding_method(mut self, method: DecodingMethod) -> Self {
        self.decoding_method = method;
        self
    }

    pub fn with_repetition_penalty(mut self, penalty: f32) -> Self {
        self.repetition_penalty = penalty;
        self
    }

    pub fn with_default_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.default_max_new_tokens = max_new_tokens;
        self
    }

    pub fn with_token_cache(mut self, policy: TokenCachePolicy) -> Self {
        self.token_cache = policy;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    /// Full URL of the generation endpoint, including the version query.
    pub fn generation_url(&self) -> String {
        let base = if self.cluster_url.contains("://") {
            self.cluster_url.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.cluster_url.trim_end_matches('/'))
        };
        let method = if self.streaming {
            "generation_stream"
        } else {
            "generation"
        };
        format!(
            "{base}/ml/v1/text/{method}?version={}",
            self.api_version
        )
    }

    /// Full URL of the identity token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/identity/token", self.identity_url.trim_end_matches('/'))
    }

    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from any key/value source shaped like the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cluster_url = var("WATSONX_URL").ok_or_else(|| {
            Error::config("WATSONX_URL environment variable is required")
        })?;

        let deployment = match (var("WATSONX_PROJECT_ID"), var("WATSONX_SPACE_ID")) {
            (Some(project_id), _) => Deployment::Project(project_id),
            (None, Some(space_id)) => Deployment::Space(space_id),
            (None, None) => {
                return Err(Error::config(
                    "Either WATSONX_PROJECT_ID or WATSONX_SPACE_ID must be set",
                ))
            }
        };

        let mut config = Self::new(cluster_url, deployment);

        if let Some(api_key) = var("WATSONX_API_KEY") {
            config = config.with_api_key(api_key);
        } else if let Some(token) = var("WATSONX_ACCESS_TOKEN") {
            config = config.with_access_token(token);
        }

        if let Some(identity_url) = var("WATSONX_IAM_URL") {
            config = config.with_identity_url(identity_url);
        }
        if let Some(api_version) = var("WATSONX_API_VERSION") {
            config = config.with_api_version(api_version);
        }
        if let Some(preamble) = var("WATSONX_SYSTEM_PROMPT") {
            config = config.with_system_preamble(preamble);
        }
        if let Some(ttl) = var("WATSONX_TOKEN_TTL_SECS") {
            let secs: u64 = ttl.trim().parse().map_err(|_| {
                Error::config(format!("WATSONX_TOKEN_TTL_SECS must be an integer, got '{ttl}'"))
            })?;
            config = config.with_token_cache(TokenCachePolicy::Ttl(Duration::from_secs(secs)));
        }
        if let Some(streaming) = var("WATSONX_STREAMING") {
            match streaming.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => config.streaming = true,
                "false" | "0" | "no" => config.streaming = false,
                other => {
                    return Err(Error::config(format!(
                        "Invalid WATSONX_STREAMING '{other}'. Valid values are: true, false"
                    )))
                }
            }
        }

        Ok(config)
    }
}
