use crate::client::{CallContext, ChatClientBuilder};
use crate::config::ProviderConfig;
use crate::drivers::{create_provider, ChatProvider, ProviderKind};
use crate::error::BoxError;
use crate::types::{ChatRequest, Delta};
use crate::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Per-call statistics (for logging/metrics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStats {
    pub provider: ProviderKind,
    pub model: String,
    pub request_id: String,
    pub duration_ms: u128,
    /// Callback invocations that completed successfully.
    pub deltas: usize,
}

/// Thin facade over one backend: correlation id, default deadline, logging.
#[derive(Debug, Clone)]
pub struct ChatClient {
    provider: Arc<dyn ChatProvider>,
    default_timeout: Option<Duration>,
}

impl ChatClient {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            default_timeout: None,
        }
    }

    /// Shortcut for `create_provider(name, config)` wrapped in a client.
    pub fn from_name(name: &str, config: ProviderConfig) -> Result<Self> {
        Ok(Self::new(create_provider(name, config)?))
    }

    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::new()
    }

    pub(crate) fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn provider(&self) -> &Arc<dyn ChatProvider> {
        &self.provider
    }

    /// Runs `request` under a fresh context carrying the default timeout, if any.
    pub async fn chat(&self, request: ChatRequest) -> Result<CallStats> {
        let mut ctx = CallContext::new();
        if let Some(timeout) = self.default_timeout {
            ctx = ctx.with_timeout(timeout);
        }
        self.chat_with(&ctx, request).await
    }

    pub async fn chat_with(&self, ctx: &CallContext, mut request: ChatRequest) -> Result<CallStats> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let provider = self.provider.kind();
        let model = request.model.clone();
        let stream = request
            .stream
            .resolve(provider.streams_by_default());

        let counter = Arc::new(AtomicUsize::new(0));
        if let Some(mut inner) = request.on_delta.take() {
            let counter = counter.clone();
            request.on_delta = Some(Box::new(move |delta: Delta<'_>| -> std::result::Result<(), BoxError> {
                inner(delta)?;
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }));
        }

        info!(
            provider = %provider,
            model = %model,
            stream,
            request_id = %request_id,
            "chat started"
        );
        let started = Instant::now();
        let outcome = self.provider.chat(ctx, request).await;
        let duration_ms = started.elapsed().as_millis();
        let deltas = counter.load(Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                info!(
                    provider = %provider,
                    model = %model,
                    request_id = %request_id,
                    deltas,
                    duration_ms = duration_ms as u64,
                    "chat finished"
                );
                Ok(CallStats {
                    provider,
                    model,
                    request_id,
                    duration_ms,
                    deltas,
                })
            }
            Err(err) => {
                let http_status = err.upstream().map(|u| u.http_status).unwrap_or(0);
                warn!(
                    provider = %provider,
                    model = %model,
                    request_id = %request_id,
                    error_kind = %err.kind(),
                    error_code = %err.standard_code(),
                    http_status,
                    deltas,
                    duration_ms = duration_ms as u64,
                    "chat failed: {}",
                    err
                );
                Err(err)
            }
        }
    }
}
