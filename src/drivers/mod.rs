//! Provider 驱动抽象层：通过 trait 实现多后端对话接口的动态分发
//!
//! Provider driver abstraction layer.
//!
//! Three structurally different backends sit behind one [`ChatProvider`] trait:
//!
//! | Kind | Module | Wire |
//! |------|--------|------|
//! | [`ProviderKind::Ollama`] | [`ollama`] | `/api/chat`, NDJSON stream |
//! | [`ProviderKind::OpenAi`] | [`openai`] | `/chat/completions`, SSE via event-source client |
//! | [`ProviderKind::Gemini`] | [`gemini`] | `:generateContent` / `:streamGenerateContent?alt=sse`, hand-framed SSE |
//!
//! Request and response shapes stay private to each module.

pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::client::CallContext;
use crate::config::ProviderConfig;
use crate::types::ChatRequest;
use crate::{Error, ErrorContext, Result};

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// The fixed set of backend identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Ollama, Self::OpenAi, Self::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Prefix for `<PREFIX>_API_KEY` style variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Ollama => "OLLAMA",
            Self::OpenAi => "OPENAI",
            Self::Gemini => "GEMINI",
        }
    }

    /// Whether the backend streams when the request leaves it unspecified.
    pub fn streams_by_default(&self) -> bool {
        matches!(self, Self::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    /// Case-insensitive; the empty name selects the local daemon.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(Error::configuration_with_context(
                format!("unknown provider {:?} (expected ollama, openai or gemini)", other),
                ErrorContext::new().with_field_path("provider"),
            )),
        }
    }
}

/// One chat backend.
///
/// Implementations hold only immutable configuration and a pooled transport,
/// so a single instance may serve concurrent calls.
#[async_trait]
pub trait ChatProvider: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Runs one request, delivering deltas to its callback in production order.
    ///
    /// Fragments delivered before a failure are not retracted. A callback
    /// error stops consumption and is returned unchanged.
    async fn chat(&self, ctx: &CallContext, request: ChatRequest) -> Result<()>;
}

/// Builds the backend registered under `name`.
///
/// Unknown names and invalid configuration fail here, before any I/O.
pub fn create_provider(name: &str, config: ProviderConfig) -> Result<Arc<dyn ChatProvider>> {
    let kind: ProviderKind = name.parse()?;
    create_provider_for(kind, config)
}

pub fn create_provider_for(
    kind: ProviderKind,
    config: ProviderConfig,
) -> Result<Arc<dyn ChatProvider>> {
    let provider: Arc<dyn ChatProvider> = match kind {
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config)?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(config)?),
    };
    Ok(provider)
}
