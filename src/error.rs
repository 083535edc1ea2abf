//! 统一错误类型：将三类后端的失败形态归并为同一套分类。
//!
//! Unified error taxonomy shared by every backend.
//!
//! Callers branch on [`Error::kind`] without knowing which backend produced the
//! failure. Callback failures are carried verbatim inside [`Error::Callback`].

use crate::error_code::StandardErrorCode;
use crate::transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Boxed error returned by delta callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "request.model")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., a trimmed response snippet)
    pub details: Option<String>,
    /// Stage that produced the error (e.g., "gemini.stream", "openai.decode")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse failure category, stable across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing/invalid model, missing credentials, unknown backend. Raised before any I/O.
    Configuration,
    /// Connection, DNS, timeout, cancellation.
    Transport,
    /// Malformed or unexpected response shape, empty result set, frame decode failure.
    Protocol,
    /// The remote service answered with a structured failure.
    Upstream,
    /// The caller's delta callback returned an error.
    CallbackAbort,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Upstream => "upstream",
            Self::CallbackAbort => "callback_abort",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the remote service itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    /// Backend label, e.g. `"gemini"`.
    pub provider: &'static str,
    /// HTTP status of the response that carried the failure (0 when unknown, e.g. mid-stream).
    pub http_status: u16,
    /// Numeric code from the error envelope; falls back to the HTTP status.
    pub code: i64,
    /// Status token such as `RESOURCE_EXHAUSTED` or `rate_limit_error`.
    pub status: Option<String>,
    pub message: String,
    /// Multi-line human report (label, status line, sorted headers, body).
    pub detail: Option<String>,
    /// Raw response body, retained so it stays inspectable after the response is gone.
    pub body: Option<String>,
}

impl UpstreamError {
    pub fn new(provider: &'static str, http_status: u16, message: impl Into<String>) -> Self {
        Self {
            provider,
            http_status,
            code: i64::from(http_status),
            status: None,
            message: message.into(),
            detail: None,
            body: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        let status = status.into();
        self.status = if status.is_empty() { None } else { Some(status) };
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Standard classification derived from the status token, then the HTTP status.
    pub fn standard_code(&self) -> StandardErrorCode {
        let http_status = if self.http_status != 0 {
            self.http_status
        } else {
            u16::try_from(self.code).unwrap_or(0)
        };
        StandardErrorCode::classify(self.status.as_deref(), http_status)
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(detail) = &self.detail {
            f.write_str(detail)?;
            if !detail.ends_with('\n') {
                f.write_str("\n")?;
            }
        }
        match &self.status {
            Some(status) => write!(
                f,
                "{}: {} ({}): {}",
                self.provider, status, self.code, self.message
            ),
            None if self.code != 0 => {
                write!(f, "{}: code {}: {}", self.provider, self.code, self.message)
            }
            None => write!(f, "{}: {}", self.provider, self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Unified error type for every chat backend.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("Protocol error: {message}{}", format_context(.context))]
    Protocol {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Upstream(UpstreamError),

    /// The caller's callback failed; the boxed value is the callback's own error.
    #[error(transparent)]
    Callback(BoxError),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::protocol_with_context(msg, ErrorContext::new())
    }

    /// Create a new protocol error with structured context
    pub fn protocol_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Protocol {
            message: msg.into(),
            context,
        }
    }

    pub fn callback(err: BoxError) -> Self {
        Error::Callback(err)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Transport(_) | Error::Cancelled | Error::DeadlineExceeded => {
                ErrorKind::Transport
            }
            Error::Protocol { .. } | Error::Serialization(_) => ErrorKind::Protocol,
            Error::Upstream(_) => ErrorKind::Upstream,
            Error::Callback(_) => ErrorKind::CallbackAbort,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Protocol { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            Error::Upstream(e) => Some(e),
            _ => None,
        }
    }

    /// True for caller-initiated cancellation and deadline expiry.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// Borrow the callback's error, if this failure came from the callback.
    pub fn callback_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Callback(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// Hand back the exact value the callback returned.
    pub fn into_callback_error(self) -> std::result::Result<BoxError, Self> {
        match self {
            Error::Callback(e) => Ok(e),
            other => Err(other),
        }
    }

    /// Advisory classification; the runtime itself never retries.
    pub fn standard_code(&self) -> StandardErrorCode {
        match self {
            Error::Configuration { .. } | Error::Protocol { .. } | Error::Serialization(_) => {
                StandardErrorCode::InvalidRequest
            }
            Error::Transport(e) if e.is_timeout() => StandardErrorCode::Timeout,
            Error::Transport(_) => StandardErrorCode::Unknown,
            Error::Cancelled => StandardErrorCode::Cancelled,
            Error::DeadlineExceeded => StandardErrorCode::Timeout,
            Error::Upstream(e) => e.standard_code(),
            Error::Callback(_) => StandardErrorCode::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => !e.is_builder(),
            Error::Upstream(e) => e.standard_code().retryable(),
            Error::DeadlineExceeded => true,
            _ => false,
        }
    }
}
