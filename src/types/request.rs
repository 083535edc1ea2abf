//! Chat request model, builder, and the delta callback contract.

use crate::error::BoxError;
use crate::{Error, ErrorContext, Result};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Whether the backend should stream its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPreference {
    /// Let each backend apply its own default (local daemon streams, the others do not).
    #[default]
    UseBackendDefault,
    ForceEnabled,
    ForceDisabled,
}

impl StreamPreference {
    /// Maps an optional boolean flag (as found in configuration files) to a preference.
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            None => Self::UseBackendDefault,
            Some(true) => Self::ForceEnabled,
            Some(false) => Self::ForceDisabled,
        }
    }

    pub fn resolve(self, backend_default: bool) -> bool {
        match self {
            Self::UseBackendDefault => backend_default,
            Self::ForceEnabled => true,
            Self::ForceDisabled => false,
        }
    }
}

/// Desired output shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Free-form JSON, no schema attached.
    Json,
    /// Strict schema mode with the embedded JSON object as the schema.
    Schema(Value),
}

impl ResponseFormat {
    /// Parses a raw format value.
    ///
    /// `json` (bare or quoted) selects free-form JSON. A JSON object selects
    /// schema mode. Anything else falls back to free-form JSON with a warning.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "json" {
            return Self::Json;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                warn!(error = %e, "format value is not valid JSON; using free-form JSON output");
                Self::Json
            }
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => Self::Schema(value),
            Value::String(s) if s == "json" => Self::Json,
            other => {
                warn!(value = %other, "format value is not a schema object; using free-form JSON output");
                Self::Json
            }
        }
    }

    pub fn schema(&self) -> Option<&Value> {
        match self {
            Self::Json => None,
            Self::Schema(schema) => Some(schema),
        }
    }
}

/// One incremental fragment of model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delta<'a> {
    pub content: &'a str,
    /// Reasoning text; always empty for backends without a thinking channel.
    pub thinking: &'a str,
}

impl<'a> Delta<'a> {
    pub fn content(content: &'a str) -> Self {
        Self {
            content,
            thinking: "",
        }
    }

    pub fn thinking(thinking: &'a str) -> Self {
        Self {
            content: "",
            thinking,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.thinking.is_empty()
    }
}

/// Caller callback, invoked inline and in production order.
///
/// Returning an error stops the call; the same error comes back from `chat`.
pub type DeltaCallback =
    Box<dyn for<'a> FnMut(Delta<'a>) -> std::result::Result<(), BoxError> + Send>;

/// One backend-agnostic chat call.
///
/// Fields are public so callers can assemble a request directly; the
/// [`ChatRequestBuilder`] validates as it builds and every backend validates
/// again before touching the network.
#[derive(Default)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub images: Vec<Vec<u8>>,
    /// Zero means "use the backend default".
    pub temperature: f64,
    /// Zero means "use the backend default".
    pub top_p: f64,
    pub stream: StreamPreference,
    pub format: Option<ResponseFormat>,
    /// Emit no format directive at all.
    pub no_response_format: bool,
    /// Ask for the reasoning channel where the backend has one.
    pub think: bool,
    /// Backend-specific options, merged over derived values.
    pub extras: Map<String, Value>,
    pub on_delta: Option<DeltaCallback>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "model is required",
                ErrorContext::new().with_field_path("request.model"),
            ));
        }
        for (name, value) in [("request.temperature", self.temperature), ("request.top_p", self.top_p)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::configuration_with_context(
                    format!("sampling value {} is out of range", value),
                    ErrorContext::new().with_field_path(name),
                ));
            }
        }
        Ok(())
    }

    /// Detaches the callback so the rest of the request can be borrowed freely.
    pub(crate) fn take_sink(&mut self) -> DeltaSink {
        DeltaSink {
            callback: self.on_delta.take(),
        }
    }

    /// Non-empty image blobs, in order.
    pub(crate) fn image_blobs(&self) -> impl Iterator<Item = &[u8]> {
        self.images
            .iter()
            .map(Vec::as_slice)
            .filter(|blob| !blob.is_empty())
    }
}

impl fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatRequest")
            .field("model", &self.model)
            .field("prompt_len", &self.prompt.len())
            .field("system", &self.system.is_some())
            .field("images", &self.images.len())
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("stream", &self.stream)
            .field("format", &self.format)
            .field("no_response_format", &self.no_response_format)
            .field("think", &self.think)
            .field("extras", &self.extras)
            .field("on_delta", &self.on_delta.is_some())
            .finish()
    }
}

/// Forwards deltas to the caller's callback, or drops them if none was given.
pub(crate) struct DeltaSink {
    callback: Option<DeltaCallback>,
}

impl DeltaSink {
    pub(crate) fn emit(&mut self, delta: Delta<'_>) -> Result<()> {
        match self.callback.as_mut() {
            Some(callback) => callback(delta).map_err(Error::callback),
            None => Ok(()),
        }
    }
}

/// Validating builder for [`ChatRequest`].
#[derive(Default)]
pub struct ChatRequestBuilder {
    request: ChatRequest,
}

impl ChatRequestBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.request.model = model.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.request.prompt = prompt.into();
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.request.system = if system.trim().is_empty() {
            None
        } else {
            Some(system)
        };
        self
    }

    pub fn image(mut self, blob: impl Into<Vec<u8>>) -> Self {
        self.request.images.push(blob.into());
        self
    }

    pub fn images<I, B>(mut self, blobs: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        self.request.images.extend(blobs.into_iter().map(Into::into));
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.request.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.request.top_p = top_p;
        self
    }

    pub fn stream(mut self, preference: StreamPreference) -> Self {
        self.request.stream = preference;
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.request.format = Some(format);
        self
    }

    /// Raw format value, parsed with [`ResponseFormat::from_raw`]. Blank input clears the format.
    pub fn format_raw(mut self, raw: &str) -> Self {
        self.request.format = if raw.trim().is_empty() {
            None
        } else {
            Some(ResponseFormat::from_raw(raw))
        };
        self
    }

    pub fn no_response_format(mut self, suppress: bool) -> Self {
        self.request.no_response_format = suppress;
        self
    }

    pub fn think(mut self, think: bool) -> Self {
        self.request.think = think;
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.request.extras.insert(key.into(), value.into());
        self
    }

    pub fn extras(mut self, extras: Map<String, Value>) -> Self {
        for (key, value) in extras {
            self.request.extras.insert(key, value);
        }
        self
    }

    pub fn on_delta<F>(mut self, callback: F) -> Self
    where
        F: for<'a> FnMut(Delta<'a>) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.request.on_delta = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<ChatRequest> {
        self.request.validate()?;
        Ok(self.request)
    }
}
