//! Streaming client for watsonx.ai text generation.
//!
//! This library exchanges an API key for a short-lived bearer token, sends a
//! generation request and decodes the reply as an ordered stream of text
//! fragments, whether the service frames it as server-sent events,
//! newline-delimited JSON or a single JSON document.

pub mod accumulator;
pub mod auth;
pub mod config;
pub mod error;
pub mod ndjson_stream;
pub mod provider;
pub mod providers;
pub mod response;
pub mod sse_stream;
pub mod types;

// Re-export core types for easy usage
pub use accumulator::*;
pub use auth::{AccessToken, StaticTokenProvider, TokenProvider};
pub use config::{Deployment, DecodingMethod, TokenCachePolicy, WatsonxAuth, WatsonxConfig};
pub use error::Error;
pub use provider::LLMProvider;
pub use providers::*;
pub use response::*;
pub use sse_stream::SseEvent;
pub use types::*;
