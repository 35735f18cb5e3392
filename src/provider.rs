use crate::{CompletionRequest, Error, Response};

/// A trait for LLM providers that stream completions.
/// Use `response.fragments()` for streaming or `response.text().await` for
/// buffered text.
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync + 'static {
    /// Start a streamed completion.
    ///
    /// Authentication and HTTP status failures are returned here, before any
    /// fragment is produced. Errors while reading the body arrive through the
    /// returned response's stream.
    async fn stream_complete(&self, request: &CompletionRequest) -> Result<Response, Error>;
}
