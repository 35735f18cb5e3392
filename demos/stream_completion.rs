//! Stream a completion from watsonx.ai and print fragments as they arrive.
//!
//! Reads `WATSONX_URL`, `WATSONX_PROJECT_ID` (or `WATSONX_SPACE_ID`) and
//! `WATSONX_API_KEY` from the environment or a `.env` file.

use futures_util::StreamExt;
use std::io::Write;
use tracing_subscriber::EnvFilter;
use watsonx_llm::{CompletionRequest, LLMProvider, WatsonxProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let provider = WatsonxProvider::from_env()?;
    let model = std::env::var("WATSONX_MODEL_ID")
        .unwrap_or_else(|_| "ibm/granite-13b-chat-v2".to_string());

    let request = CompletionRequest::new(model, "What is the capital of France?").max_tokens(100);

    let mut fragments = provider.stream_complete(&request).await?.fragments();
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            Err(e) if e.is_recoverable() => tracing::warn!(error = %e, "skipped malformed unit"),
            Err(e) => return Err(e.into()),
        }
    }
    println!();

    Ok(())
}
