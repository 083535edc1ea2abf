//! Cross-backend failure paths: callback abort, validation, cancellation, deadlines.

use crate::mock_server::{gemini_chunk, openai_chunk, sse, MockServerFixture};
use ai_chat_rust::{
    AuthMode, BoxError, CallContext, ChatClient, ChatRequest, Delta, Error, ErrorKind,
    ProviderConfig, StreamPreference,
};
use mockito::Matcher;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, PartialEq)]
struct Halt(&'static str);

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "halt: {}", self.0)
    }
}

impl std::error::Error for Halt {}

/// Serves one request: headers, the given SSE frame, then holds the connection open.
async fn stalling_server(frame: String) -> String {
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
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        let chunk = format!("{:x}\r\n{}\r\n", frame.len(), frame);
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(chunk.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    format!("http://{}", addr)
}

fn streaming_request(model: &str) -> ChatRequest {
    let mut request = ChatRequest::new(model, "hi");
    request.stream = StreamPreference::ForceEnabled;
    request
}

#[tokio::test]
async fn test_callback_error_is_returned_unchanged() {
    let mut fixture = MockServerFixture::new().await;
    let body = ["one", "two", "three"]
        .iter()
        .map(|t| sse(&gemini_chunk(t)))
        .collect::<String>();
    fixture
        .server
        .mock("POST", "/v1beta/models/m:streamGenerateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut request = streaming_request("m");
    request.on_delta = Some(Box::new(move |_delta: Delta<'_>| -> Result<(), BoxError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(Box::new(Halt("enough")))
    }));

    let client = fixture.keyed_client("gemini", "k", AuthMode::ApiKey);
    let err = client.chat(request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CallbackAbort);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let inner = err.into_callback_error().unwrap();
    assert_eq!(*inner.downcast::<Halt>().unwrap(), Halt("enough"));
}

#[tokio::test]
async fn test_callback_abort_on_each_backend() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(format!(
            "{}{}data: [DONE]\n\n",
            sse(&openai_chunk("a")),
            sse(&openai_chunk("b"))
        ))
        .create_async()
        .await;
    fixture
        .server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body("{\"message\":{\"content\":\"a\"}}\n{\"message\":{\"content\":\"b\"}}\n")
        .create_async()
        .await;

    for provider in ["openai", "ollama"] {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut request = streaming_request("m");
        request.on_delta = Some(Box::new(move |_delta: Delta<'_>| -> Result<(), BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Box::new(Halt(provider)))
        }));

        let err = fixture.client(provider).chat(request).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "{}", provider);
        let inner = err.into_callback_error().unwrap();
        assert_eq!(*inner.downcast::<Halt>().unwrap(), Halt(provider));
    }
}

#[tokio::test]
async fn test_empty_model_never_reaches_network() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    for provider in ["ollama", "openai", "gemini"] {
        let client = fixture.keyed_client(provider, "k", AuthMode::ApiKey);
        let err = client.chat(ChatRequest::new("  ", "hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration, "{}", provider);
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("request.model")
        );
    }
    mock.assert_async().await;
}

#[test]
fn test_unknown_provider_name() {
    let err = ChatClient::from_name("bard", ProviderConfig::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("bard"));
}

#[tokio::test]
async fn test_cancel_during_stream_returns_promptly() {
    let base = stalling_server(sse(&gemini_chunk("first"))).await;
    let client = ChatClient::from_name(
        "gemini",
        ProviderConfig::new().with_base_url(base).with_api_key("k"),
    )
    .unwrap();

    let ctx = CallContext::new();
    let canceller = ctx.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut request = streaming_request("m");
    request.on_delta = Some(Box::new(move |_delta: Delta<'_>| -> Result<(), BoxError> {
        counter.fetch_add(1, Ordering::SeqCst);
        canceller.cancel();
        Ok(())
    }));

    let outcome = tokio::time::timeout(Duration::from_secs(5), client.chat_with(&ctx, request))
        .await
        .expect("cancellation must interrupt the stalled read");
    let err = outcome.unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{:?}", err);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_interrupts_event_source_stream() {
    let base = stalling_server(sse(&openai_chunk("first"))).await;
    let client = ChatClient::from_name("openai", ProviderConfig::new().with_base_url(base)).unwrap();

    let ctx = CallContext::new();
    let canceller = ctx.clone();
    let mut request = streaming_request("m");
    request.on_delta = Some(Box::new(move |_delta: Delta<'_>| -> Result<(), BoxError> {
        canceller.cancel();
        Ok(())
    }));

    let outcome = tokio::time::timeout(Duration::from_secs(5), client.chat_with(&ctx, request))
        .await
        .expect("cancellation must interrupt the stalled read");
    assert!(matches!(outcome, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_deadline_interrupts_stalled_stream() {
    let base = stalling_server(sse(&gemini_chunk("first"))).await;
    let client = ChatClient::builder()
        .provider("gemini")
        .config(ProviderConfig::new().with_base_url(base).with_api_key("k"))
        .call_timeout(Duration::from_millis(300))
        .build()
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), client.chat(streaming_request("m")))
        .await
        .expect("deadline must interrupt the stalled read");
    let err = outcome.unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded), "{:?}", err);
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_precancelled_context_fails_fast() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let ctx = CallContext::new();
    ctx.cancel();
    let err = fixture
        .client("ollama")
        .chat_with(&ctx, ChatRequest::new("m", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    mock.assert_async().await;
}
