//! Mock HTTP server setup for integration tests

use ai_chat_rust::{AuthMode, ChatClient, ChatRequest, Delta, ProviderConfig};
use mockito::{Server, ServerGuard};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Test fixture that owns a mockito server and builds clients pointed at it.
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    pub fn config(&self) -> ProviderConfig {
        ProviderConfig::new().with_base_url(self.base_url.clone())
    }

    pub fn client(&self, provider: &str) -> ChatClient {
        ChatClient::from_name(provider, self.config()).expect("client")
    }

    pub fn keyed_client(&self, provider: &str, key: &str, mode: AuthMode) -> ChatClient {
        let config = self.config().with_api_key(key).with_auth_mode(mode);
        ChatClient::from_name(provider, config).expect("client")
    }
}

/// Writes `body` in fixed-size pieces, flushing after each.
pub fn chunked(body: String, piece: usize) -> impl Fn(&mut dyn Write) -> std::io::Result<()> + Send + Sync + 'static {
    move |w: &mut dyn Write| {
        for part in body.as_bytes().chunks(piece.max(1)) {
            w.write_all(part)?;
            w.flush()?;
        }
        Ok(())
    }
}

/// SSE frame for one JSON payload.
pub fn sse(payload: &serde_json::Value) -> String {
    format!("data: {}\n\n", payload)
}

pub fn gemini_chunk(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    })
}

pub fn openai_chunk(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": text}}]
    })
}

/// Content/thinking pairs in arrival order.
pub type Recorded = Arc<Mutex<Vec<(String, String)>>>;

/// Attaches a recording callback to `builder`.
pub fn recording(builder: ai_chat_rust::ChatRequestBuilder) -> (ChatRequest, Recorded) {
    let seen: Recorded = Arc::default();
    let sink = seen.clone();
    let request = builder
        .on_delta(move |delta: Delta<'_>| {
            sink.lock()
                .unwrap()
                .push((delta.content.to_string(), delta.thinking.to_string()));
            Ok(())
        })
        .build()
        .expect("request");
    (request, seen)
}

pub fn contents(seen: &Recorded) -> Vec<String> {
    seen.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
}
