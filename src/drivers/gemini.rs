//! Gemini generateContent 驱动：手工构建请求体、端点、鉴权，并逐行解析 SSE 流
//!
//! Google Gemini-style REST backend, built by hand on reqwest. Key differences
//! from the other backends:
//! - Uses `contents` instead of `messages`, with `parts` instead of `content`.
//! - System prompt travels as a top-level `system_instruction`.
//! - `generationConfig` wraps sampling and output-format fields and is omitted when empty.
//! - Streaming is `:streamGenerateContent?alt=sse`, framed by [`SseDecoder`].
//! - The credential goes either in `?key=` or in `Authorization: Bearer`, never both.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;
use url::Url;

use crate::client::CallContext;
use crate::config::{AuthMode, ProviderConfig};
use crate::error::UpstreamError;
use crate::multimodal::InlineImage;
use crate::pipeline::{is_done_sentinel, SseDecoder};
use crate::structured::JsonModeConfig;
use crate::transport::{body_snippet, next_chunk, HttpTransport};
use crate::types::request::DeltaSink;
use crate::types::{ChatRequest, Delta};
use crate::{Error, ErrorContext, Result};

use super::{ChatProvider, ProviderKind};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const STREAM_SUFFIX: &str = ":streamGenerateContent";
const NON_STREAM_SUFFIX: &str = ":generateContent";
const VERSION_SEGMENTS: [&str; 3] = ["/v1", "/v1beta", "/v1beta1"];
const LABEL: &str = "gemini";

/// Trims a trailing slash and appends `/v1beta` unless a version segment is already present.
pub fn normalize_base_url(base: Option<&str>) -> String {
    let base = base.map(str::trim).unwrap_or_default();
    if base.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    let base = base.trim_end_matches('/');
    if VERSION_SEGMENTS.iter().any(|seg| base.ends_with(seg)) {
        base.to_string()
    } else {
        format!("{}/v1beta", base)
    }
}

pub struct GeminiProvider {
    transport: HttpTransport,
    base_url: Url,
    api_key: String,
    auth_mode: AuthMode,
    user_agent: String,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key = config.api_key().map(str::to_string).ok_or_else(|| {
            Error::configuration_with_context(
                "missing api key",
                ErrorContext::new()
                    .with_field_path("api_key")
                    .with_source("gemini.new"),
            )
        })?;

        let base = normalize_base_url(config.base_url());
        let base_url = Url::parse(&base).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base url {:?}: {}", base, e),
                ErrorContext::new().with_field_path("base_url"),
            )
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::configuration_with_context(
                format!("base url {:?} cannot carry a path", base),
                ErrorContext::new().with_field_path("base_url"),
            ));
        }

        Ok(Self {
            transport: HttpTransport::new(&config.transport)?,
            base_url,
            api_key,
            auth_mode: config.auth_mode,
            user_agent: config.user_agent().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// `{base}/models/{model}{suffix}` with `alt=sse` when streaming and the
    /// key parameter in query-key mode.
    pub fn endpoint(&self, model: &str, stream: bool) -> Result<Url> {
        let model = model.trim();
        if model.is_empty() {
            return Err(model_required());
        }
        let suffix = if stream { STREAM_SUFFIX } else { NON_STREAM_SUFFIX };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::configuration("base url cannot carry a path"))?
            .pop_if_empty()
            .push("models")
            .push(&format!("{}{}", model, suffix));

        if stream {
            url.query_pairs_mut().append_pair("alt", "sse");
        }
        if self.auth_mode == AuthMode::ApiKey {
            url.query_pairs_mut().append_pair("key", &self.api_key);
        }
        Ok(url)
    }

    /// Everything before the first await: validation, body, endpoint, headers.
    fn prepare(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::RequestBuilder> {
        let body = build_request_body(request)?;
        let url = self.endpoint(&request.model, stream)?;

        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        let mut builder = self
            .transport
            .client()
            .post(url)
            .header(reqwest::header::ACCEPT, accept)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .json(&body);
        if self.auth_mode == AuthMode::AuthToken {
            builder = builder.bearer_auth(&self.api_key);
        }
        Ok(builder)
    }

    async fn check_status(
        &self,
        ctx: &CallContext,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status().as_u16();
        if status < 400 {
            return Ok(response);
        }
        let body = self
            .transport
            .read_text(ctx, "gemini.error_body", response)
            .await?;
        Err(classify_error_body(status, &body))
    }

    async fn stream(
        &self,
        ctx: &CallContext,
        builder: reqwest::RequestBuilder,
        sink: &mut DeltaSink,
    ) -> Result<()> {
        let response = self.transport.send(ctx, "gemini.stream", builder).await?;
        let response = self.check_status(ctx, response).await?;

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = next_chunk(ctx, "gemini.stream.read", &mut body).await? {
            decoder.push(&chunk);
            while let Some(event) = decoder.next_event() {
                dispatch_event(&event, sink)?;
            }
        }
        if let Some(event) = decoder.finish() {
            dispatch_event(&event, sink)?;
        }
        Ok(())
    }

    async fn non_stream(
        &self,
        ctx: &CallContext,
        builder: reqwest::RequestBuilder,
        sink: &mut DeltaSink,
    ) -> Result<()> {
        let builder = self.transport.single_shot(builder);
        let response = self.transport.send(ctx, "gemini.request", builder).await?;
        let status = response.status().as_u16();
        let response = self.check_status(ctx, response).await?;
        let text = self
            .transport
            .read_text(ctx, "gemini.read", response)
            .await?;

        let out: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
            Error::protocol_with_context(
                format!("decode response: {}", e),
                ErrorContext::new()
                    .with_source("gemini.decode")
                    .with_details(body_snippet(&text)),
            )
        })?;
        if let Some(payload) = out.error {
            return Err(payload.into_error(status, &text));
        }
        let candidates = out.candidates.unwrap_or_default();
        if candidates.is_empty() {
            return Err(Error::protocol_with_context(
                "response contained no candidates",
                ErrorContext::new()
                    .with_source("gemini.decode")
                    .with_details(body_snippet(&text)),
            ));
        }
        emit_candidates(&candidates, sink)
    }
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url.as_str())
            .field("auth_mode", &self.auth_mode)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn chat(&self, ctx: &CallContext, mut request: ChatRequest) -> Result<()> {
        request.validate()?;
        let stream = request
            .stream
            .resolve(ProviderKind::Gemini.streams_by_default());
        let mut sink = request.take_sink();
        let builder = self.prepare(&request, stream)?;

        if stream {
            self.stream(ctx, builder, &mut sink).await
        } else {
            self.non_stream(ctx, builder, &mut sink).await
        }
    }
}

fn model_required() -> Error {
    Error::configuration_with_context(
        "model is required",
        ErrorContext::new()
            .with_field_path("request.model")
            .with_source("gemini.endpoint"),
    )
}

/// Trims, parses and dispatches one SSE payload.
fn dispatch_event(payload: &str, sink: &mut DeltaSink) -> Result<()> {
    let trimmed = payload.trim();
    if trimmed.is_empty() || is_done_sentinel(trimmed) {
        return Ok(());
    }
    debug!(bytes = trimmed.len(), "gemini frame");

    let chunk: GenerateResponse = serde_json::from_str(trimmed).map_err(|e| {
        Error::protocol_with_context(
            format!("decode stream chunk: {}", e),
            ErrorContext::new()
                .with_source("gemini.stream")
                .with_details(body_snippet(trimmed)),
        )
    })?;
    if let Some(payload) = chunk.error {
        return Err(payload.into_error(0, trimmed));
    }
    emit_candidates(&chunk.candidates.unwrap_or_default(), sink)
}

/// Candidate order, then part order; empty parts are skipped.
fn emit_candidates(candidates: &[Candidate], sink: &mut DeltaSink) -> Result<()> {
    for candidate in candidates {
        let parts = candidate
            .content
            .as_ref()
            .and_then(|c| c.parts.as_deref())
            .unwrap_or_default();
        for part in parts {
            let text = part.text.as_deref().unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            let delta = if part.thought {
                Delta::thinking(text)
            } else {
                Delta::content(text)
            };
            sink.emit(delta)?;
        }
    }
    Ok(())
}

fn classify_error_body(status: u16, body: &str) -> Error {
    if let Ok(ErrorEnvelope {
        error: Some(payload),
    }) = serde_json::from_str::<ErrorEnvelope>(body)
    {
        return payload.into_error(status, body);
    }
    let snippet = body_snippet(body);
    let message = if snippet.is_empty() {
        format!("http {}", status)
    } else {
        format!("http {}: {}", status, snippet)
    };
    Error::Upstream(UpstreamError::new(LABEL, status, message).with_body(body))
}

fn build_request_body(request: &ChatRequest) -> Result<GenerateRequest<'_>> {
    let mut parts = Vec::with_capacity(1 + request.images.len());
    let prompt = request.prompt.trim();
    if !prompt.is_empty() {
        parts.push(Part::Text { text: prompt });
    }
    for blob in request.image_blobs() {
        let image = InlineImage::from_bytes(blob);
        parts.push(Part::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type,
                data: image.data,
            },
        });
    }
    if parts.is_empty() {
        return Err(Error::configuration_with_context(
            "prompt or images are required",
            ErrorContext::new()
                .with_field_path("request.prompt")
                .with_source("gemini.body"),
        ));
    }

    let system_instruction = request
        .system
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|text| Content {
            role: None,
            parts: vec![Part::Text { text }],
        });

    Ok(GenerateRequest {
        contents: vec![Content {
            role: Some("user"),
            parts,
        }],
        system_instruction,
        generation_config: generation_config(request),
    })
}

fn generation_config(request: &ChatRequest) -> Option<GenerationConfig> {
    let format =
        JsonModeConfig::negotiate(request.format.as_ref(), request.no_response_format)
            .to_gemini_format();
    let cfg = GenerationConfig {
        temperature: non_zero(request.temperature),
        top_p: non_zero(request.top_p),
        top_k: extract_top_k(&request.extras),
        response_mime_type: format.response_mime_type,
        response_schema: format.response_schema,
        thinking_config: request.think.then_some(ThinkingConfig {
            include_thoughts: true,
        }),
    };
    if cfg.is_empty() {
        None
    } else {
        Some(cfg)
    }
}

fn non_zero(v: f64) -> Option<f64> {
    if v == 0.0 {
        None
    } else {
        Some(v)
    }
}

/// `topK` wins over `top_k`; integers, floats (truncated) and numeric strings are accepted.
fn extract_top_k(extras: &Map<String, Value>) -> Option<i64> {
    ["topK", "top_k"]
        .iter()
        .find_map(|key| extras.get(*key).and_then(value_to_int))
}

fn value_to_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.response_mime_type.is_none()
            && self.response_schema.is_none()
            && self.thinking_config.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    include_thoughts: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

impl ErrorPayload {
    fn into_error(self, http_status: u16, body: &str) -> Error {
        let code = if self.code != 0 {
            self.code
        } else {
            i64::from(http_status)
        };
        Error::Upstream(
            UpstreamError::new(LABEL, http_status, self.message)
                .with_code(code)
                .with_status(self.status)
                .with_body(body),
        )
    }
}
