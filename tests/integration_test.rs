use futures_util::StreamExt;
use serde_json::json;
use std::time::Duration;
use watsonx_llm::{
    CompletionRequest, Deployment, Error, FinishReason, LLMProvider, TokenCachePolicy,
    WatsonxConfig, WatsonxProvider,
};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_PATH: &str = "/ml/v1/text/generation_stream";
const GRANT_TYPE: &str = "grant_type=urn%3Aibm%3Aparams%3Aoauth%3Agrant-type%3Aapikey";

/// Load test fixture from file
fn load_fixture(filename: &str) -> String {
    std::fs::read_to_string(filename)
        .unwrap_or_else(|_| panic!("Failed to load test fixture: {filename}"))
}

fn config(server: &MockServer) -> WatsonxConfig {
    WatsonxConfig::new(server.uri(), Deployment::Project("test-project".to_string()))
        .with_identity_url(server.uri())
}

fn sse(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/event-stream")
}

async fn mount_identity(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains(GRANT_TYPE))
        .and(body_string_contains("apikey=test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "refresh_token": "not_supported",
            "token_type": "Bearer",
            "expires_in": 3600,
            "expiration": 1_714_557_600u64
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn collect_fragments(response: watsonx_llm::Response) -> Vec<String> {
    response
        .fragments()
        .map(|fragment| fragment.expect("fragment should decode"))
        .collect()
        .await
}

#[tokio::test]
async fn test_unauthenticated_sse_scenario() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("version", "2023-05-29"))
        .and(header("accept", "application/json"))
        .respond_with(sse(
            "data: {\"content\":\"Hi\"}\n\ndata: {\"content\":\" there\"}\n\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server)).unwrap();
    let request = CompletionRequest::new("granite-13b", "hello").max_tokens(10);

    let response = provider.stream_complete(&request).await.unwrap();
    let fragments = collect_fragments(response).await;

    assert_eq!(fragments, vec!["Hi", " there"]);
    assert_eq!(fragments.concat(), "Hi there");

    // No identity exchange and no Authorization header without a credential.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), STREAM_PATH);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_api_key_exchange_and_streamed_results() {
    let server = MockServer::start().await;
    mount_identity(&server, "tok-123", 1).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(header("authorization", "Bearer tok-123"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "input": "<|system|>\nAnswer politely.\n<|user|>\nSay hello\n<|assistant|>\n",
            "parameters": {
                "decoding_method": "greedy",
                "max_new_tokens": 50,
                "min_new_tokens": 0,
                "stop_sequences": [],
                "include_stop_sequence": false,
                "repetition_penalty": 1.05
            },
            "model_id": "ibm/granite-13b-chat-v2",
            "project_id": "test-project"
        })))
        .respond_with(sse(load_fixture(
            "tests/fixtures/watsonx/generation_stream.sse",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(
        config(&server)
            .with_api_key("test-key")
            .with_system_preamble("Answer politely."),
    )
    .unwrap();
    let request = CompletionRequest::new("ibm/granite-13b-chat-v2", "Say hello").max_tokens(50);

    let complete = provider
        .stream_complete(&request)
        .await
        .unwrap()
        .buffer()
        .await
        .unwrap();

    assert_eq!(complete.content, "Hello! How can I help you today?");
    assert_eq!(complete.finish_reason, Some(FinishReason::Stop));
    assert_eq!(complete.usage.input_tokens, 12);
    assert_eq!(complete.usage.output_tokens, 8);
}

#[tokio::test]
async fn test_identity_rejection_stops_before_generation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errorCode": "BXNIM0415E",
            "errorMessage": "Provided API key could not be found."
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse("data: {\"content\":\"unreachable\"}\n\n"))
        .expect(0)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server).with_api_key("test-key")).unwrap();
    let result = provider
        .stream_complete(&CompletionRequest::new("granite-13b", "hello"))
        .await;

    match result {
        Err(Error::Auth(message)) => assert!(message.contains("401")),
        Err(other) => panic!("expected auth error, got {other:?}"),
        Ok(_) => panic!("expected auth error, got a response"),
    }
}

#[tokio::test]
async fn test_identity_response_without_token_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token_type": "Bearer" })))
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server).with_api_key("test-key")).unwrap();
    let result = provider
        .stream_complete(&CompletionRequest::new("granite-13b", "hello"))
        .await;

    assert!(matches!(result, Err(Error::Auth(_))));
}

#[tokio::test]
async fn test_server_error_yields_status_and_no_fragments() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server)).unwrap();
    let result = provider
        .stream_complete(&CompletionRequest::new("granite-13b", "hello"))
        .await;

    match result {
        Err(error @ Error::HttpStatus { .. }) => {
            assert_eq!(error.status(), Some(500));
            assert!(!error.is_recoverable());
        }
        Err(other) => panic!("expected HTTP status error, got {other:?}"),
        Ok(_) => panic!("expected HTTP status error, got a response"),
    }
}

#[tokio::test]
async fn test_per_call_policy_fetches_a_token_every_call() {
    let server = MockServer::start().await;
    mount_identity(&server, "tok-fresh", 2).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(header("authorization", "Bearer tok-fresh"))
        .respond_with(sse("data: {\"content\":\"ok\"}\n\n"))
        .expect(2)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server).with_api_key("test-key")).unwrap();
    let request = CompletionRequest::new("granite-13b", "hello");

    for _ in 0..2 {
        let text = provider.stream_complete(&request).await.unwrap().text().await.unwrap();
        assert_eq!(text, "ok");
    }
}

#[tokio::test]
async fn test_ttl_policy_reuses_the_token() {
    let server = MockServer::start().await;
    mount_identity(&server, "tok-cached", 1).await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(header("authorization", "Bearer tok-cached"))
        .respond_with(sse("data: {\"content\":\"ok\"}\n\n"))
        .expect(3)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(
        config(&server)
            .with_api_key("test-key")
            .with_token_cache(TokenCachePolicy::Ttl(Duration::from_secs(600))),
    )
    .unwrap();
    let request = CompletionRequest::new("granite-13b", "hello");

    for _ in 0..3 {
        let text = provider.stream_complete(&request).await.unwrap().text().await.unwrap();
        assert_eq!(text, "ok");
    }
}

#[tokio::test]
async fn test_buffered_endpoint_single_document() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ml/v1/text/generation"))
        .and(query_param("version", "2024-03-14"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                load_fixture("tests/fixtures/watsonx/generation.json"),
                "application/json",
            ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(
        config(&server)
            .with_streaming(false)
            .with_api_version("2024-03-14"),
    )
    .unwrap();

    let complete = provider
        .stream_complete(&CompletionRequest::new("ibm/granite-13b-chat-v2", "Say hello"))
        .await
        .unwrap()
        .buffer()
        .await
        .unwrap();

    assert_eq!(complete.content, "Hello! How can I help you today?");
    assert_eq!(complete.finish_reason, Some(FinishReason::Length));
}

#[tokio::test]
async fn test_ndjson_body_with_a_malformed_line() {
    let server = MockServer::start().await;

    let body = "{\"results\":[{\"generated_text\":\"one \"}]}\n\
                {\"results\":[{\"generated_text\":\n\
                {\"results\":[{\"generated_text\":\"two\",\"stop_reason\":\"stop_sequence\"}]}\n";

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server)).unwrap();
    let events: Vec<_> = provider
        .stream_complete(&CompletionRequest::new("granite-13b", "count"))
        .await
        .unwrap()
        .stream()
        .collect()
        .await;

    let decode_errors = events
        .iter()
        .filter(|e| matches!(e, Err(Error::Decode { .. })))
        .count();
    assert_eq!(decode_errors, 1);

    let text: String = events
        .iter()
        .filter_map(|e| e.as_ref().ok().and_then(|e| e.as_delta()))
        .collect();
    assert_eq!(text, "one two");
}

#[tokio::test]
async fn test_static_access_token_is_sent_verbatim() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(header("authorization", "Bearer pre-issued"))
        .respond_with(sse("data: {\"content\":\"ok\"}\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server).with_access_token("pre-issued")).unwrap();
    let text = provider
        .stream_complete(&CompletionRequest::new("granite-13b", "hello"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(text, "ok");
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/identity/token"));
}

#[tokio::test]
async fn test_provider_serves_new_calls_after_early_drop() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse(load_fixture(
            "tests/fixtures/watsonx/generation_stream.sse",
        )))
        .expect(2)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server)).unwrap();
    let request = CompletionRequest::new("granite-13b", "hello");

    let mut fragments = provider.stream_complete(&request).await.unwrap().fragments();
    let first = fragments.next().await.unwrap().unwrap();
    assert_eq!(first, "Hello");
    drop(fragments);

    // The provider stays usable after a consumer walks away mid-stream.
    let text = provider.stream_complete(&request).await.unwrap().text().await.unwrap();
    assert_eq!(text, "Hello! How can I help you today?");
}

#[tokio::test]
async fn test_stalled_response_headers_time_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse("data: {\"content\":\"late\"}\n\n").set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(
        config(&server).with_read_timeout(Duration::from_millis(100)),
    )
    .unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        provider.stream_complete(&CompletionRequest::new("granite-13b", "hello")),
    )
    .await
    .expect("stream_complete should give up on its own");

    match result {
        Err(Error::Timeout(waited)) => assert_eq!(waited, Duration::from_millis(100)),
        Err(other) => panic!("expected timeout, got {other:?}"),
        Ok(_) => panic!("expected timeout, got a response"),
    }
}

#[tokio::test]
async fn test_empty_access_token_sends_no_authorization_header() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse("data: {\"content\":\"ok\"}\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = WatsonxProvider::new(config(&server).with_access_token("")).unwrap();
    let text = provider
        .stream_complete(&CompletionRequest::new("granite-13b", "hello"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(text, "ok");
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}
