//! OpenAI-compatible gateway against a mock server: event-source streaming and completions.

use crate::mock_server::{chunked, contents, openai_chunk, recording, sse, MockServerFixture};
use ai_chat_rust::{AuthMode, ChatRequest, ErrorKind, StandardErrorCode, StreamPreference};
use mockito::Matcher;
use serde_json::json;

const PATH: &str = "/v1/chat/completions";

fn request() -> ai_chat_rust::ChatRequestBuilder {
    ChatRequest::builder()
        .model("gpt-test")
        .prompt("say hi")
        .temperature(0.2)
        .top_p(0.9)
}

#[tokio::test]
async fn test_stream_stops_at_done_sentinel() {
    let mut fixture = MockServerFixture::new().await;
    let body = format!(
        "{}{}{}data: [DONE]\n\n{}",
        sse(&openai_chunk("Hel")),
        sse(&json!({"choices": [{"delta": {"role": "assistant"}}]})),
        sse(&openai_chunk(" lo ")),
        sse(&openai_chunk("after-done"))
    );
    let mock = fixture
        .server
        .mock("POST", PATH)
        .match_header("authorization", "Bearer sk-1")
        .match_header("x-api-key", "sk-1")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-test",
            "stream": true,
            "temperature": 0.2,
            "top_p": 0.9
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = fixture.keyed_client("openai", "sk-1", AuthMode::ApiKey);
    let (req, seen) = recording(request().stream(StreamPreference::ForceEnabled));
    let stats = client.chat(req).await.unwrap();

    mock.assert_async().await;
    assert_eq!(contents(&seen), vec!["Hel", "lo"]);
    assert_eq!(stats.deltas, 2);
}

#[tokio::test]
async fn test_stream_survives_small_chunks() {
    let mut fixture = MockServerFixture::new().await;
    let body = format!(
        "{}{}data: [DONE]\n\n",
        sse(&openai_chunk("first")),
        sse(&openai_chunk("second"))
    );
    fixture
        .server
        .mock("POST", PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_chunked_body(chunked(body, 5))
        .create_async()
        .await;

    let client = fixture.client("openai");
    let (req, seen) = recording(request().stream(StreamPreference::ForceEnabled));
    client.chat(req).await.unwrap();
    assert_eq!(contents(&seen), vec!["first", "second"]);
}

#[tokio::test]
async fn test_keyless_gateway_sends_no_credentials() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", PATH)
        .match_header("authorization", Matcher::Missing)
        .match_header("x-api-key", Matcher::Missing)
        .with_status(200)
        .with_body(json!({"choices": [{"message": {"content": "hi"}}]}).to_string())
        .create_async()
        .await;

    let client = fixture.client("openai");
    let (req, seen) = recording(request());
    client.chat(req).await.unwrap();
    mock.assert_async().await;
    assert_eq!(contents(&seen), vec!["hi"]);
}

#[tokio::test]
async fn test_non_stream_invokes_callback_once() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", PATH)
        .match_body(Matcher::PartialJson(json!({
            "response_format": {"type": "json_object"}
        })))
        .with_status(200)
        .with_body(
            json!({"choices": [
                {"message": {"content": "  {\"a\": 1}\n"}},
                {"message": {"content": "ignored"}}
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let client = fixture.client("openai");
    let (req, seen) = recording(request().format_raw("json"));
    client.chat(req).await.unwrap();
    mock.assert_async().await;
    assert_eq!(contents(&seen), vec!["{\"a\": 1}"]);
}

#[tokio::test]
async fn test_suppressed_format_sends_no_response_format() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", PATH)
        .match_body(Matcher::Regex("^[^_]*(_[^f][^_]*)*$".into()))
        .with_status(200)
        .with_body(json!({"choices": [{"message": {"content": "x"}}]}).to_string())
        .create_async()
        .await;

    let client = fixture.client("openai");
    let (req, _) = recording(request().format_raw("json").no_response_format(true));
    client.chat(req).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_choices_is_protocol_error() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", PATH)
        .with_status(200)
        .with_body(json!({"choices": []}).to_string())
        .create_async()
        .await;

    let client = fixture.client("openai");
    let (req, seen) = recording(request());
    let err = client.chat(req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("empty choices"));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_error_report_lists_status_headers_and_body() {
    let mut fixture = MockServerFixture::new().await;
    let body = json!({"error": {"message": "slow down", "type": "rate_limit_error"}}).to_string();
    fixture
        .server
        .mock("POST", PATH)
        .with_status(429)
        .with_header("x-request-id", "req-42")
        .with_body(body.clone())
        .create_async()
        .await;

    let client = fixture.client("openai");
    let (req, _) = recording(request());
    let err = client.chat(req).await.unwrap_err();

    let upstream = err.upstream().unwrap();
    assert_eq!(upstream.http_status, 429);
    assert_eq!(upstream.message, "slow down");
    assert_eq!(upstream.status.as_deref(), Some("rate_limit_error"));
    assert_eq!(upstream.body.as_deref(), Some(body.as_str()));
    assert_eq!(err.standard_code(), StandardErrorCode::RateLimited);

    let report = err.to_string();
    assert!(report.starts_with("openai: chat completion failed\nstatus: 429 Too Many Requests\nheaders:\n"));
    assert!(report.contains("  x-request-id: req-42\n"));
    assert!(report.contains(&format!("body:\n{}\n", body)));
}

#[tokio::test]
async fn test_stream_status_failure_is_upstream_error() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", PATH)
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let client = fixture.client("openai");
    let (req, _) = recording(request().stream(StreamPreference::ForceEnabled));
    let err = client.chat(req).await.unwrap_err();

    let upstream = err.upstream().unwrap();
    assert_eq!(upstream.http_status, 503);
    assert_eq!(upstream.message, "overloaded");
    assert!(err
        .to_string()
        .starts_with("openai: streaming chat completion failed\nstatus: 503 Service Unavailable\n"));
}

#[tokio::test]
async fn test_mid_stream_error_payload() {
    let mut fixture = MockServerFixture::new().await;
    let body = format!(
        "{}{}",
        sse(&openai_chunk("ok")),
        sse(&json!({"error": {"message": "context overflow", "code": "context_length_exceeded"}}))
    );
    fixture
        .server
        .mock("POST", PATH)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = fixture.client("openai");
    let (req, seen) = recording(request().stream(StreamPreference::ForceEnabled));
    let err = client.chat(req).await.unwrap_err();
    let upstream = err.upstream().unwrap();
    assert_eq!(upstream.message, "context overflow");
    assert_eq!(upstream.status.as_deref(), Some("context_length_exceeded"));
    assert_eq!(contents(&seen), vec!["ok"]);
}
