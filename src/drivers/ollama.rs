//! 本地 Ollama 守护进程驱动：NDJSON 逐条回调
//!
//! Local model-serving daemon backend (`POST /api/chat`).
//!
//! The daemon answers with one JSON object per line, streaming by default.
//! Every unit is handed to a per-unit closure that forwards its content and
//! thinking text to the caller unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use tracing::debug;
use url::Url;

use crate::client::CallContext;
use crate::config::ProviderConfig;
use crate::error::UpstreamError;
use crate::multimodal::encode_base64;
use crate::pipeline::NdjsonDecoder;
use crate::structured::JsonModeConfig;
use crate::transport::{body_snippet, next_chunk, HttpTransport};
use crate::types::{ChatRequest, Delta, StreamPreference};
use crate::{Error, ErrorContext, Result};

use super::{ChatProvider, ProviderKind};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 11434;

const LABEL: &str = "ollama";

/// Resolves an `OLLAMA_HOST`-style value into a base URL.
///
/// | Input | Result |
/// |-------|--------|
/// | unset / blank | `http://127.0.0.1:11434` |
/// | `0.0.0.0` | `http://0.0.0.0:11434` |
/// | `example.com:1234` | `http://example.com:1234` |
/// | `https://example.com` | `https://example.com:443` |
/// | `http://example.com/ollama` | `http://example.com:80/ollama` |
pub fn resolve_host(raw: Option<&str>) -> String {
    let raw = raw.map(str::trim).unwrap_or_default();
    let raw = raw.trim_matches(|c| c == '"' || c == '\'');

    let (scheme, rest, default_port) = match raw.split_once("://") {
        Some((scheme, rest)) => {
            let port = match scheme {
                "https" => 443,
                "http" => 80,
                _ => DEFAULT_PORT,
            };
            (scheme, rest, port)
        }
        None => ("http", raw, DEFAULT_PORT),
    };

    let (hostport, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].trim_end_matches('/')),
        None => (rest, ""),
    };
    let (host, port) = split_host_port(hostport);
    let host = if host.is_empty() { DEFAULT_HOST } else { host };
    let port = port.unwrap_or(default_port);
    format!("{}://{}:{}{}", scheme, host, port, path)
}

fn split_host_port(hostport: &str) -> (&str, Option<u16>) {
    if hostport.starts_with('[') {
        if let Some(end) = hostport.find(']') {
            let port = hostport[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok());
            return (&hostport[..=end], port);
        }
    }
    match hostport.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (hostport, None),
        },
        _ => (hostport, None),
    }
}

#[derive(Debug)]
pub struct OllamaProvider {
    transport: HttpTransport,
    base_url: String,
    user_agent: String,
}

impl OllamaProvider {
    /// `base_url` wins; otherwise `OLLAMA_HOST` is resolved.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let base_url = match config.base_url() {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => resolve_host(env::var("OLLAMA_HOST").ok().as_deref()),
        };
        Url::parse(&base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid daemon url {:?}: {}", base_url, e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_source("ollama.new"),
            )
        })?;

        Ok(Self {
            transport: HttpTransport::new(&config.transport)?,
            base_url,
            user_agent: config.user_agent().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn prepare(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        let body = build_request_body(request);
        self.transport
            .client()
            .post(format!("{}/api/chat", self.base_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .json(&body)
    }

    /// Sends the request and invokes `on_unit` for every response object, in order.
    async fn exchange<F>(
        &self,
        ctx: &CallContext,
        builder: reqwest::RequestBuilder,
        mut on_unit: F,
    ) -> Result<()>
    where
        F: FnMut(&UnitMessage) -> Result<()> + Send,
    {
        let response = self.transport.send(ctx, "ollama.chat", builder).await?;
        let status = response.status().as_u16();
        if status >= 400 {
            let body = self
                .transport
                .read_text(ctx, "ollama.error_body", response)
                .await?;
            return Err(classify_error_body(status, &body));
        }

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = NdjsonDecoder::new();
        while let Some(chunk) = next_chunk(ctx, "ollama.stream.read", &mut body).await? {
            decoder.push(&chunk);
            while let Some(unit) = decoder.next_item::<ChatUnit>() {
                handle_unit(unit?, &mut on_unit)?;
            }
        }
        if let Some(unit) = decoder.finish::<ChatUnit>() {
            handle_unit(unit?, &mut on_unit)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn chat(&self, ctx: &CallContext, mut request: ChatRequest) -> Result<()> {
        request.validate()?;
        let mut sink = request.take_sink();
        let mut builder = self.prepare(&request);
        if stream_flag(request.stream) == Some(false) {
            builder = self.transport.single_shot(builder);
        }

        self.exchange(ctx, builder, |message| {
            sink.emit(Delta {
                content: &message.content,
                thinking: &message.thinking,
            })
        })
        .await
    }
}

fn handle_unit<F>(unit: ChatUnit, on_unit: &mut F) -> Result<()>
where
    F: FnMut(&UnitMessage) -> Result<()>,
{
    if let Some(message) = unit.error.filter(|m| !m.is_empty()) {
        return Err(Error::Upstream(
            UpstreamError::new(LABEL, 0, message).with_code(0),
        ));
    }
    debug!(done = unit.done, "ollama unit");
    on_unit(&unit.message.unwrap_or_default())
}

fn classify_error_body(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            let snippet = body_snippet(body);
            if snippet.is_empty() {
                format!("http {}", status)
            } else {
                snippet
            }
        });
    Error::Upstream(UpstreamError::new(LABEL, status, message).with_body(body))
}

/// The transport flag: omitted unless streaming is explicitly disabled.
fn stream_flag(preference: StreamPreference) -> Option<bool> {
    match preference {
        StreamPreference::ForceDisabled => Some(false),
        StreamPreference::UseBackendDefault | StreamPreference::ForceEnabled => None,
    }
}

/// Derived sampling options overlaid by caller extras.
fn merge_options(request: &ChatRequest) -> Map<String, Value> {
    let mut options = Map::new();
    options.insert("enable_thinking".into(), Value::Bool(request.think));
    if request.temperature != 0.0 {
        options.insert("temperature".into(), Value::from(request.temperature));
    }
    if request.top_p != 0.0 {
        options.insert("top_p".into(), Value::from(request.top_p));
    }
    for (key, value) in &request.extras {
        options.insert(key.clone(), value.clone());
    }
    options
}

fn build_request_body(request: &ChatRequest) -> OllamaChatRequest<'_> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        messages.push(Message {
            role: "system",
            content: system,
            images: Vec::new(),
        });
    }
    messages.push(Message {
        role: "user",
        content: &request.prompt,
        images: request.image_blobs().map(encode_base64).collect(),
    });

    OllamaChatRequest {
        model: request.model.trim(),
        messages,
        stream: stream_flag(request.stream),
        think: request.think,
        options: merge_options(request),
        format: JsonModeConfig::negotiate(request.format.as_ref(), request.no_response_format)
            .to_ollama_format(),
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    think: bool,
    options: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUnit {
    #[serde(default)]
    message: Option<UnitMessage>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Default, Deserialize)]
struct UnitMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}
