use crate::config::DecodingMethod;
use crate::types::{FinishReason, Usage};
use serde::{Deserialize, Serialize};

/// Text generation request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub input: String,
    pub parameters: GenerationParameters,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
}

/// Generation parameters as named by the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParameters {
    pub decoding_method: DecodingMethod,
    pub max_new_tokens: u32,
    pub min_new_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub include_stop_sequence: bool,
    pub repetition_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

/// One decoded unit of a generation response (a whole document, an SSE
/// frame or an NDJSON line all share this shape).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationChunk {
    #[serde(default)]
    pub results: Vec<GenerationResult>,
    /// Some endpoints stream bare `{"content": "..."}` frames instead.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub errors: Vec<ServiceError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub generated_text: String,
    #[serde(default)]
    pub generated_token_count: Option<u32>,
    #[serde(default)]
    pub input_token_count: Option<u32>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

impl GenerationResult {
    pub fn usage(&self) -> Usage {
        Usage {
            input_tokens: self.input_token_count.unwrap_or_default(),
            output_tokens: self.generated_token_count.unwrap_or_default(),
        }
    }
}

/// `stop_reason` values reported per result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NotFinished,
    MaxTokens,
    EosToken,
    Cancelled,
    TimeLimit,
    StopSequence,
    TokenLimit,
    Error,
    #[serde(other)]
    Unknown,
}

impl StopReason {
    /// Terminal reasons map to a finish reason; `not_finished` does not.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        match self {
            StopReason::NotFinished | StopReason::Unknown => None,
            StopReason::MaxTokens => Some(FinishReason::Length),
            StopReason::EosToken => Some(FinishReason::Stop),
            StopReason::Cancelled => Some(FinishReason::Cancelled),
            StopReason::TimeLimit => Some(FinishReason::TimeLimit),
            StopReason::StopSequence => Some(FinishReason::StopSequence),
            StopReason::TokenLimit => Some(FinishReason::TokenLimit),
            StopReason::Error => Some(FinishReason::Error),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Identity service token response.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Seconds until the token expires.
    #[serde(default)]
    pub expires_in: Option<u64>,
}
