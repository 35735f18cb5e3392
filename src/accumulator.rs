//! Fragment accumulation for streaming responses.

use crate::types::{FinishReason, StreamEvent, Usage};
use crate::CompleteResponse;

/// Accumulates streamed fragments into a complete response.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    /// Fragments concatenated in arrival order.
    content: String,
    /// Number of fragments seen so far.
    fragments: usize,
    /// Final finish reason (if received).
    finish_reason: Option<FinishReason>,
    /// Final usage statistics (if received).
    usage: Option<Usage>,
}

impl ResponseAccumulator {
    /// Create a new response accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a stream event and update the accumulation.
    pub fn process_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::ContentDelta { delta } => {
                self.content.push_str(&delta);
                self.fragments += 1;
            }
            StreamEvent::Done {
                finish_reason,
                usage,
            } => {
                self.finish_reason = Some(finish_reason);
                self.usage = Some(usage);
            }
        }
    }

    /// Text accumulated so far.
    pub fn current_content(&self) -> &str {
        &self.content
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Finalize and return the complete response.
    pub fn finalize(self) -> CompleteResponse {
        CompleteResponse {
            content: self.content,
            finish_reason: self.finish_reason,
            usage: self.usage.unwrap_or_default(),
        }
    }
}
