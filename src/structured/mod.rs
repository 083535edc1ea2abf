//! Structured output negotiation.
//!
//! - `JsonModeConfig::negotiate`: pick a directive from the request's format hint
//! - `to_openai_format` / `to_ollama_format` / `to_gemini_format`: render it per backend
//!
//! # Examples
//!
//! ```
//! use ai_chat_rust::structured::JsonModeConfig;
//! use ai_chat_rust::types::ResponseFormat;
//!
//! let cfg = JsonModeConfig::negotiate(Some(&ResponseFormat::Json), false);
//! assert_eq!(cfg.to_openai_format().unwrap()["type"], "json_object");
//! assert_eq!(cfg.to_ollama_format().unwrap(), "json");
//! ```

pub mod json_mode;

pub use json_mode::{GeminiFormat, JsonMode, JsonModeConfig, DEFAULT_SCHEMA_NAME};
