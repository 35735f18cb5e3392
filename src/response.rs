//! Response handling for LLM generations.

use crate::{Error, FinishReason, StreamEvent, Usage};
use futures_util::stream::{BoxStream, Stream};
use futures_util::StreamExt;

/// A fully buffered completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteResponse {
    /// All fragments concatenated in emission order.
    pub content: String,
    /// `None` when the body ended without a terminal stop reason, in which
    /// case `content` may be truncated.
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

impl CompleteResponse {
    /// Whether the service reported the generation as finished.
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Response from an LLM generation that can be streamed or buffered.
///
/// Dropping a `Response` (or the stream taken from it) releases the
/// underlying connection.
pub struct Response {
    stream: BoxStream<'static, Result<StreamEvent, Error>>,
}

impl Response {
    /// Create a new response from a stream of events.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<StreamEvent, Error>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
        }
    }

    /// Stream the response events, including recoverable decode errors.
    pub fn stream(self) -> BoxStream<'static, Result<StreamEvent, Error>> {
        self.stream
    }

    /// Stream only the text fragments.
    pub fn fragments(self) -> BoxStream<'static, Result<String, Error>> {
        self.stream
            .filter_map(|event| async move {
                match event {
                    Ok(StreamEvent::ContentDelta { delta }) => Some(Ok(delta)),
                    Ok(StreamEvent::Done { .. }) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed()
    }

    /// Buffer the entire response by consuming the stream.
    ///
    /// Malformed units are skipped; any other error aborts buffering.
    pub async fn buffer(mut self) -> Result<CompleteResponse, Error> {
        let mut accumulator = crate::accumulator::ResponseAccumulator::new();

        while let Some(event) = self.stream.next().await {
            match event {
                Ok(event) => accumulator.process_event(event),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "skipping malformed stream unit");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(accumulator.finalize())
    }

    /// Get just the text content (convenience method).
    pub async fn text(self) -> Result<String, Error> {
        Ok(self.buffer().await?.content)
    }
}
