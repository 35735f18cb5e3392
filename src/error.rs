use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when using the watsonx-llm library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Generation endpoint returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Failed to decode stream unit: {message} (unit: {unit})")]
    Decode { unit: String, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Streaming(String),
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }

    pub fn decode(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Whether the stream that produced this error can keep going.
    ///
    /// Only a single malformed unit in an incremental framing is recoverable;
    /// fragments decoded before and after it stay valid.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }

    /// HTTP status of a failed generation request, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
