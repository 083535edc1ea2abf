//! OpenAI 兼容 REST 驱动：单次请求走 reqwest，流式迭代走 event-source 客户端
//!
//! OpenAI-compatible chat completions backend.
//!
//! - Single-shot: one POST, one decode, exactly one callback with the first choice.
//! - Streaming: [`reqwest_eventsource`] iterates the chunk stream; `[DONE]` ends it.
//! - API failures carry a multi-line report (label, status line, sorted headers, body).

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::fmt::Write as _;
use tracing::debug;

use crate::client::CallContext;
use crate::config::ProviderConfig;
use crate::error::UpstreamError;
use crate::multimodal::InlineImage;
use crate::pipeline::is_done_sentinel;
use crate::structured::JsonModeConfig;
use crate::transport::{body_snippet, HttpTransport, TransportError};
use crate::types::request::DeltaSink;
use crate::types::{ChatRequest, Delta};
use crate::{Error, ErrorContext, Result};

use super::{ChatProvider, ProviderKind};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const LABEL: &str = "openai";
const COMPLETION_FAILED: &str = "openai: chat completion failed";
const STREAM_FAILED: &str = "openai: streaming chat completion failed";

/// Trims a trailing slash and appends `/v1` when missing.
pub fn normalize_base_url(base: Option<&str>) -> String {
    let base = base.map(str::trim).unwrap_or_default();
    if base.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    let base = base.trim_end_matches('/');
    if base.ends_with("/v1") {
        base.to_string()
    } else {
        format!("{}/v1", base)
    }
}

pub struct OpenAiProvider {
    transport: HttpTransport,
    base_url: String,
    api_key: Option<String>,
    user_agent: String,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(&config.transport)?,
            base_url: normalize_base_url(config.base_url()),
            api_key: config.api_key().map(str::to_string),
            user_agent: config.user_agent().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn prepare(&self, request: &ChatRequest, stream: bool) -> reqwest::RequestBuilder {
        let body = build_request_body(request, stream);
        let mut builder = self
            .transport
            .client()
            .post(format!("{}/chat/completions", self.base_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .json(&body);
        if let Some(key) = &self.api_key {
            // some gateways read X-Api-Key instead of Authorization
            builder = builder.bearer_auth(key).header("X-Api-Key", key);
        }
        builder
    }

    async fn non_stream(
        &self,
        ctx: &CallContext,
        builder: reqwest::RequestBuilder,
        sink: &mut DeltaSink,
    ) -> Result<()> {
        let builder = self.transport.single_shot(builder);
        let response = self
            .transport
            .send(ctx, "openai.request", builder)
            .await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = self
            .transport
            .read_text(ctx, "openai.read", response)
            .await?;
        if status.as_u16() >= 400 {
            return Err(api_error(COMPLETION_FAILED, status, &headers, text));
        }

        let completion: Completion = serde_json::from_str(&text).map_err(|e| {
            Error::protocol_with_context(
                format!("decode response: {}", e),
                ErrorContext::new()
                    .with_source("openai.decode")
                    .with_details(body_snippet(&text)),
            )
        })?;
        let Some(first) = completion.choices.unwrap_or_default().into_iter().next() else {
            return Err(Error::protocol_with_context(
                "empty choices",
                ErrorContext::new()
                    .with_source("openai.decode")
                    .with_details(body_snippet(&text)),
            ));
        };
        let content = first
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();
        sink.emit(Delta::content(content.trim()))
    }

    async fn stream(
        &self,
        ctx: &CallContext,
        builder: reqwest::RequestBuilder,
        sink: &mut DeltaSink,
    ) -> Result<()> {
        ctx.check()?;
        let mut source = EventSource::new(builder)
            .map_err(|e| TransportError::other("openai.stream", e.to_string()))?;
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));
        let mut guard = EventSourceGuard(source);

        while let Some(event) = ctx.run(guard.0.next()).await? {
            match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => {
                    if is_done_sentinel(&message.data) {
                        break;
                    }
                    dispatch_chunk(&message.data, sink)?;
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => return Err(self.stream_failure(ctx, e).await),
            }
        }
        Ok(())
    }

    async fn stream_failure(&self, ctx: &CallContext, err: reqwest_eventsource::Error) -> Error {
        use reqwest_eventsource::Error as EsError;
        match err {
            EsError::InvalidStatusCode(status, response) => {
                let headers = response.headers().clone();
                match self
                    .transport
                    .read_text(ctx, "openai.stream.error_body", response)
                    .await
                {
                    Ok(body) => api_error(STREAM_FAILED, status, &headers, body),
                    Err(e) => e,
                }
            }
            EsError::Transport(e) => TransportError::http("openai.stream", e).into(),
            EsError::InvalidContentType(value, _) => Error::protocol_with_context(
                format!("unexpected content type {:?}", value),
                ErrorContext::new().with_source("openai.stream"),
            ),
            other => Error::protocol_with_context(
                format!("stream terminated: {}", other),
                ErrorContext::new().with_source("openai.stream"),
            ),
        }
    }
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn chat(&self, ctx: &CallContext, mut request: ChatRequest) -> Result<()> {
        request.validate()?;
        let stream = request
            .stream
            .resolve(ProviderKind::OpenAi.streams_by_default());
        let mut sink = request.take_sink();
        let builder = self.prepare(&request, stream);

        if stream {
            self.stream(ctx, builder, &mut sink).await
        } else {
            self.non_stream(ctx, builder, &mut sink).await
        }
    }
}

/// Closes the event source on every exit path.
struct EventSourceGuard(EventSource);

impl Drop for EventSourceGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

fn build_request_body(request: &ChatRequest, stream: bool) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        messages.push(json!({"role": "system", "content": system}));
    }

    let mut parts = vec![json!({"type": "text", "text": request.prompt.trim()})];
    for blob in request.image_blobs() {
        let url = InlineImage::from_bytes(blob).data_url();
        parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
    }
    messages.push(json!({"role": "user", "content": parts}));

    let mut body = Map::new();
    body.insert("model".into(), Value::String(request.model.trim().to_string()));
    body.insert("messages".into(), Value::Array(messages));
    body.insert("temperature".into(), json!(request.temperature));
    body.insert("top_p".into(), json!(request.top_p));

    let format = JsonModeConfig::negotiate(request.format.as_ref(), request.no_response_format);
    if let Some(response_format) = format.to_openai_format() {
        body.insert("response_format".into(), response_format);
    }

    for (key, value) in &request.extras {
        body.insert(key.clone(), value.clone());
    }
    // the transport mode follows the resolved preference, not extras
    if stream {
        body.insert("stream".into(), Value::Bool(true));
    } else {
        body.remove("stream");
    }
    Value::Object(body)
}

fn dispatch_chunk(data: &str, sink: &mut DeltaSink) -> Result<()> {
    let chunk: Chunk = serde_json::from_str(data).map_err(|e| {
        Error::protocol_with_context(
            format!("decode stream chunk: {}", e),
            ErrorContext::new()
                .with_source("openai.stream")
                .with_details(body_snippet(data)),
        )
    })?;
    if let Some(err) = chunk.error {
        let token = err.status_token().unwrap_or_default();
        return Err(Error::Upstream(
            UpstreamError::new(LABEL, 0, err.message.unwrap_or_default())
                .with_code(0)
                .with_status(token)
                .with_body(data),
        ));
    }

    let content = chunk
        .choices
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();
    let content = content.trim();
    if content.is_empty() {
        return Ok(());
    }
    debug!(bytes = content.len(), "openai delta");
    sink.emit(Delta::content(content))
}

/// Builds the structured API error with its human-readable report.
fn api_error(label: &str, status: StatusCode, headers: &HeaderMap, body: String) -> Error {
    let detail = format_api_error_detail(label, status, headers, &body);
    let envelope = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error);

    let (message, token) = match envelope {
        Some(err) => {
            let token = err.status_token();
            (err.message.unwrap_or_default(), token)
        }
        None => {
            let snippet = body_snippet(&body);
            let message = if snippet.is_empty() {
                status.canonical_reason().unwrap_or("api error").to_string()
            } else {
                snippet
            };
            (message, None)
        }
    };

    Error::Upstream(
        UpstreamError::new(LABEL, status.as_u16(), message)
            .with_status(token.unwrap_or_default())
            .with_detail(detail)
            .with_body(body),
    )
}

fn format_api_error_detail(label: &str, status: StatusCode, headers: &HeaderMap, body: &str) -> String {
    let mut out = String::new();
    out.push_str(label);
    out.push('\n');

    match status.canonical_reason() {
        Some(reason) => {
            let _ = writeln!(out, "status: {} {}", status.as_u16(), reason);
        }
        None => {
            let _ = writeln!(out, "status: {}", status.as_u16());
        }
    }

    out.push_str("headers:\n");
    let mut pairs: Vec<(&str, String)> = headers
        .iter()
        .map(|(k, v)| (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    // stable: repeated headers keep their order
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    if pairs.is_empty() {
        out.push_str("  <none>\n");
    }
    for (key, value) in pairs {
        let _ = writeln!(out, "  {}: {}", key, value);
    }

    out.push_str("body:\n");
    if body.is_empty() {
        out.push_str("  <empty>\n");
    } else {
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Option<Vec<CompletionChoice>>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

impl ApiErrorBody {
    /// Error `type`, or a string `code` when the type is missing.
    fn status_token(&self) -> Option<String> {
        self.kind
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| match &self.code {
                Some(Value::String(code)) if !code.is_empty() => Some(code.clone()),
                _ => None,
            })
    }
}
