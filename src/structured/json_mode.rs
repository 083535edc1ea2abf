//! JSON mode negotiation for structured output.
//!
//! Translates the caller's [`ResponseFormat`] into each backend's native
//! directive. Negotiation never fails: anything that is not a schema object
//! was already folded into free-form JSON when the request was built.

use crate::types::ResponseFormat;
use serde_json::{json, Value};

/// Name given to embedded schemas where the backend requires one.
pub const DEFAULT_SCHEMA_NAME: &str = "response";

/// JSON mode options for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonMode {
    /// Standard JSON mode - guarantees valid JSON output
    Json,

    /// JSON with schema - requires strict schema compliance
    JsonSchema,

    /// Disabled - no format directive is sent
    Off,
}

impl JsonMode {
    /// Get the string representation used by OpenAI-compatible APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonMode::Json => "json_object",
            JsonMode::JsonSchema => "json_schema",
            JsonMode::Off => "",
        }
    }
}

impl std::fmt::Display for JsonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JsonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json_object" | "json" => Ok(JsonMode::Json),
            "json_schema" => Ok(JsonMode::JsonSchema),
            "off" | "" => Ok(JsonMode::Off),
            _ => Err(format!("Unknown JSON mode: {}", s)),
        }
    }
}

/// Gemini keeps its format directive inside `generationConfig`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeminiFormat {
    pub response_mime_type: Option<&'static str>,
    pub response_schema: Option<Value>,
}

/// Negotiated format directive, renderable for every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonModeConfig {
    pub mode: JsonMode,

    /// Only used for `JsonSchema` mode.
    pub schema: Option<Value>,

    /// Name for the schema (OpenAI requires one)
    pub schema_name: String,

    pub strict: bool,
}

impl JsonModeConfig {
    pub fn json_object() -> Self {
        Self {
            mode: JsonMode::Json,
            schema: None,
            schema_name: DEFAULT_SCHEMA_NAME.to_string(),
            strict: true,
        }
    }

    /// Example:
    ///
    /// ```
    /// use ai_chat_rust::structured::{JsonMode, JsonModeConfig};
    /// use serde_json::json;
    ///
    /// let config = JsonModeConfig::from_schema(json!({"type": "object"}), "answer", true);
    /// assert_eq!(config.mode, JsonMode::JsonSchema);
    /// assert_eq!(config.to_openai_format().unwrap()["json_schema"]["name"], "answer");
    /// ```
    pub fn from_schema(schema: Value, name: impl Into<String>, strict: bool) -> Self {
        Self {
            mode: JsonMode::JsonSchema,
            schema: Some(schema),
            schema_name: name.into(),
            strict,
        }
    }

    pub fn off() -> Self {
        Self {
            mode: JsonMode::Off,
            schema: None,
            schema_name: DEFAULT_SCHEMA_NAME.to_string(),
            strict: false,
        }
    }

    /// Picks the directive for a request.
    ///
    /// | suppress | format            | result                |
    /// |----------|-------------------|-----------------------|
    /// | true     | any               | `Off`                 |
    /// | false    | absent / `Json`   | `Json`, no schema     |
    /// | false    | `Schema(obj)`     | `JsonSchema`, strict  |
    pub fn negotiate(format: Option<&ResponseFormat>, suppress: bool) -> Self {
        if suppress {
            return Self::off();
        }
        match format {
            Some(ResponseFormat::Schema(schema)) => {
                Self::from_schema(schema.clone(), DEFAULT_SCHEMA_NAME, true)
            }
            Some(ResponseFormat::Json) | None => Self::json_object(),
        }
    }

    fn effective_mode(&self) -> JsonMode {
        match (self.mode, &self.schema) {
            (JsonMode::JsonSchema, None) => JsonMode::Json,
            (mode, _) => mode,
        }
    }

    /// The `response_format` value for OpenAI-compatible chat completions.
    pub fn to_openai_format(&self) -> Option<Value> {
        match self.effective_mode() {
            JsonMode::Off => None,
            JsonMode::Json => Some(json!({ "type": JsonMode::Json.as_str() })),
            JsonMode::JsonSchema => Some(json!({
                "type": JsonMode::JsonSchema.as_str(),
                "json_schema": {
                    "name": self.schema_name,
                    "strict": self.strict,
                    "schema": self.schema,
                }
            })),
        }
    }

    /// The `format` value for the local daemon: `"json"` or the schema itself.
    pub fn to_ollama_format(&self) -> Option<Value> {
        match self.effective_mode() {
            JsonMode::Off => None,
            JsonMode::Json => Some(Value::String("json".to_string())),
            JsonMode::JsonSchema => self.schema.clone(),
        }
    }

    pub fn to_gemini_format(&self) -> GeminiFormat {
        match self.effective_mode() {
            JsonMode::Off => GeminiFormat::default(),
            JsonMode::Json => GeminiFormat {
                response_mime_type: Some("application/json"),
                response_schema: None,
            },
            JsonMode::JsonSchema => GeminiFormat {
                response_mime_type: Some("application/json"),
                response_schema: self.schema.clone(),
            },
        }
    }
}
