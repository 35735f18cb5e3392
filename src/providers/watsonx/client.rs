use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::auth::IamTokenProvider;
use super::decoder;
use super::types::{GenerationParameters, GenerationRequest};
use crate::auth::{StaticTokenProvider, TokenProvider};
use crate::config::{Deployment, WatsonxAuth, WatsonxConfig};
use crate::provider::LLMProvider;
use crate::{CompletionRequest, Error, Response};

/// watsonx.ai text generation provider.
pub struct WatsonxProvider {
    client: Client,
    config: WatsonxConfig,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl WatsonxProvider {
    /// Create a new provider from configuration.
    pub fn new(config: WatsonxConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        let token_provider: Option<Arc<dyn TokenProvider>> = match &config.auth {
            WatsonxAuth::ApiKey(api_key) if !api_key.is_empty() => {
                Some(Arc::new(IamTokenProvider::new(
                    client.clone(),
                    config.token_url(),
                    api_key.clone(),
                    config.token_timeout,
                    config.token_cache,
                )))
            }
            WatsonxAuth::AccessToken(token) if !token.is_empty() => {
                Some(Arc::new(StaticTokenProvider::new(token.clone())))
            }
            WatsonxAuth::ApiKey(_) | WatsonxAuth::AccessToken(_) | WatsonxAuth::None => None,
        };

        Ok(Self {
            client,
            config,
            token_provider,
        })
    }

    /// Create a provider from environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(WatsonxConfig::from_env()?)
    }

    /// Replace the token source, e.g. with one shared between providers.
    pub fn with_token_provider(mut self, token_provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(token_provider);
        self
    }

    pub fn config(&self) -> &WatsonxConfig {
        &self.config
    }

    /// Convert a completion request to the generation API body.
    pub fn build_payload(&self, request: &CompletionRequest) -> GenerationRequest {
        build_payload(request, &self.config)
    }
}

/// Render the role-delimited prompt the chat models expect.
pub fn format_prompt(prompt: &str, system_preamble: Option<&str>) -> String {
    let mut input = String::new();
    if let Some(preamble) = system_preamble {
        input.push_str(&format!("<|system|>\n{preamble}\n"));
    }
    input.push_str(&format!("<|user|>\n{prompt}\n"));
    input.push_str("<|assistant|>\n");
    input
}

/// Convert a completion request to the generation API body.
///
/// Pure: the same request and configuration always give the same payload.
pub fn build_payload(request: &CompletionRequest, config: &WatsonxConfig) -> GenerationRequest {
    let (project_id, space_id) = match &config.deployment {
        Deployment::Project(id) => (Some(id.clone()), None),
        Deployment::Space(id) => (None, Some(id.clone())),
    };

    GenerationRequest {
        input: format_prompt(&request.prompt, config.system_preamble.as_deref()),
        parameters: GenerationParameters {
            decoding_method: config.decoding_method,
            max_new_tokens: request.max_tokens.unwrap_or(config.default_max_new_tokens),
            min_new_tokens: 0,
            stop_sequences: request.stop.clone().unwrap_or_default(),
            include_stop_sequence: false,
            repetition_penalty: config.repetition_penalty,
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
        },
        model_id: request.model.clone(),
        project_id,
        space_id,
    }
}

/// Wrap a body so that waiting longer than `idle` for the next chunk ends it
/// with [`Error::Timeout`].
fn with_idle_timeout<S>(body: S, idle: Duration) -> impl Stream<Item = Result<Bytes, Error>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin,
{
    stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(Error::Http(e)), None)),
            Ok(None) => None,
            Err(_) => Some((Err(Error::Timeout(idle)), None)),
        }
    })
}

#[async_trait::async_trait]
impl LLMProvider for WatsonxProvider {
    async fn stream_complete(&self, request: &CompletionRequest) -> Result<Response, Error> {
        let token = match &self.token_provider {
            Some(provider) => {
                tracing::debug!(model = %request.model, "authenticating");
                provider.token().await?
            }
            None => None,
        };

        let payload = self.build_payload(request);
        let url = self.config.generation_url();

        let mut request_builder = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(&payload);

        if let Some(token) = &token {
            request_builder = request_builder.header("Authorization", token.bearer());
        }

        tracing::debug!(%url, model = %request.model, authenticated = token.is_some(), "sending generation request");
        let read_timeout = self.config.read_timeout;
        let response = tokio::time::timeout(read_timeout, request_builder.send())
            .await
            .map_err(|_| {
                tracing::debug!(?read_timeout, "no response headers before timeout");
                Error::Timeout(read_timeout)
            })??;

        let status = response.status();
        if !status.is_success() {
            let message = tokio::time::timeout(read_timeout, response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            tracing::debug!(status = status.as_u16(), "generation request failed");
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        tracing::debug!(content_type = ?content_type, "streaming response body");

        let body = Box::pin(with_idle_timeout(
            Box::pin(response.bytes_stream()),
            read_timeout,
        ));
        let events = decoder::decode(body, content_type.as_deref());

        Ok(Response::from_stream(events))
    }
}
