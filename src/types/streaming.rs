//! Types for streaming responses.

use serde::{Deserialize, Serialize};

/// Events that can be emitted during streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of generated text was received.
    ContentDelta { delta: String },
    /// The service reported a terminal stop reason.
    Done {
        finish_reason: FinishReason,
        usage: Usage,
    },
}

impl StreamEvent {
    /// The text fragment carried by this event, if any.
    pub fn as_delta(&self) -> Option<&str> {
        match self {
            StreamEvent::ContentDelta { delta } => Some(delta),
            StreamEvent::Done { .. } => None,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Reason why generation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model produced its end-of-sequence token.
    Stop,
    /// `max_new_tokens` was reached.
    Length,
    /// One of the configured stop sequences was generated.
    StopSequence,
    /// The model's context window was exhausted.
    TokenLimit,
    TimeLimit,
    Cancelled,
    Error,
}
