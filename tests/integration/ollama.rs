//! Local daemon backend against a mock server: NDJSON units and request shape.

use crate::mock_server::{chunked, contents, recording, MockServerFixture};
use ai_chat_rust::transport::TransportConfig;
use ai_chat_rust::{ChatClient, ChatRequest, ErrorKind, ProviderConfig, StreamPreference};
use mockito::Matcher;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const PATH: &str = "/api/chat";

fn ndjson(units: &[serde_json::Value]) -> String {
    units.iter().map(|u| format!("{}\n", u)).collect()
}

fn unit(content: &str, thinking: &str, done: bool) -> serde_json::Value {
    json!({
        "model": "llama-test",
        "message": {"role": "assistant", "content": content, "thinking": thinking},
        "done": done
    })
}

#[tokio::test]
async fn test_units_forwarded_unchanged_including_empty() {
    let mut fixture = MockServerFixture::new().await;
    let body = ndjson(&[
        unit("", "hmm", false),
        unit("Hi", "", false),
        unit(" there", "", false),
        unit("", "", true),
    ]);
    let mock = fixture
        .server
        .mock("POST", PATH)
        .match_body(Matcher::PartialJson(json!({
            "model": "llama-test",
            "think": true,
            "options": {"enable_thinking": true, "temperature": 0.5, "num_ctx": 4096}
        })))
        .with_status(200)
        .with_header("content-type", "application/x-ndjson")
        .with_chunked_body(chunked(body, 4))
        .create_async()
        .await;

    let client = fixture.client("ollama");
    let (req, seen) = recording(
        ChatRequest::builder()
            .model("llama-test")
            .prompt("hello")
            .temperature(0.5)
            .think(true)
            .extra("num_ctx", 4096),
    );
    let stats = client.chat(req).await.unwrap();

    mock.assert_async().await;
    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            (String::new(), "hmm".to_string()),
            ("Hi".to_string(), String::new()),
            (" there".to_string(), String::new()),
            (String::new(), String::new()),
        ]
    );
    assert_eq!(stats.deltas, 4);
}

#[tokio::test]
async fn test_disabled_stream_sends_false_and_reads_single_unit() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", PATH)
        .match_body(Matcher::PartialJson(json!({"stream": false, "format": "json"})))
        .with_status(200)
        .with_body(unit("{\"ok\":true}", "", true).to_string())
        .create_async()
        .await;

    let client = fixture.client("ollama");
    let (req, seen) = recording(
        ChatRequest::builder()
            .model("llama-test")
            .prompt("hello")
            .stream(StreamPreference::ForceDisabled)
            .format_raw("json"),
    );
    client.chat(req).await.unwrap();

    mock.assert_async().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(seen.lock().unwrap()[0].0, "{\"ok\":true}");
}

#[tokio::test]
async fn test_model_not_found_is_upstream_error() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", PATH)
        .with_status(404)
        .with_body(json!({"error": "model \"nope\" not found"}).to_string())
        .create_async()
        .await;

    let client = fixture.client("ollama");
    let (req, _) = recording(ChatRequest::builder().model("nope").prompt("x"));
    let err = client.chat(req).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    let upstream = err.upstream().unwrap();
    assert_eq!(upstream.http_status, 404);
    assert_eq!(upstream.message, "model \"nope\" not found");
}

#[tokio::test]
async fn test_error_unit_mid_stream() {
    let mut fixture = MockServerFixture::new().await;
    let body = format!(
        "{}\n{}\n{}",
        unit("a", "", false),
        json!({"error": "out of memory"}),
        unit("b", "", true)
    );
    fixture
        .server
        .mock("POST", PATH)
        .with_status(200)
        .with_body(format!("{}\n", body))
        .create_async()
        .await;

    let client = fixture.client("ollama");
    let (req, seen) = recording(ChatRequest::builder().model("m").prompt("x"));
    let err = client.chat(req).await.unwrap_err();
    assert_eq!(err.upstream().unwrap().message, "out of memory");
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_unit_is_protocol_error() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", PATH)
        .with_status(200)
        .with_body("{\"message\": \n")
        .create_async()
        .await;

    let client = fixture.client("ollama");
    let (req, _) = recording(ChatRequest::builder().model("m").prompt("x"));
    let err = client.chat(req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

/// Serves one request, writing `count` NDJSON units `gap` apart.
async fn slow_daemon(count: usize, gap: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            seen.extend_from_slice(&buf[..n]);
        }
        let head = "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n";
        socket.write_all(head.as_bytes()).await.unwrap();
        for i in 0..count {
            let line = format!("{}\n", unit(&format!("t{}", i), "", i + 1 == count));
            let chunk = format!("{:x}\r\n{}\r\n", line.len(), line);
            socket.write_all(chunk.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(gap).await;
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
        socket.flush().await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_steady_stream_outlives_transport_timeout() {
    let base = slow_daemon(5, Duration::from_millis(400)).await;
    let config = ProviderConfig::new()
        .with_base_url(base)
        .with_transport(TransportConfig::default().with_timeout(Duration::from_secs(1)));
    let client = ChatClient::from_name("ollama", config).unwrap();

    let (req, seen) = recording(ChatRequest::builder().model("m").prompt("x"));
    let stats = tokio::time::timeout(Duration::from_secs(10), client.chat(req))
        .await
        .expect("stream finishes")
        .unwrap();

    assert_eq!(contents(&seen), vec!["t0", "t1", "t2", "t3", "t4"]);
    assert_eq!(stats.deltas, 5);
}
