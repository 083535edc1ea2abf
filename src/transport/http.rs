use crate::client::CallContext;
use crate::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use tracing::warn;

/// Cap for response bodies quoted in error messages.
pub const BODY_SNIPPET_LIMIT: usize = 2048;

/// Connection settings shared by every backend. Immutable once built.
///
/// `timeout` caps single-shot exchanges only. Streams run until the body ends
/// or the call's [`CallContext`] fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy_url: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            proxy_url: None,
        }
    }
}

impl TransportConfig {
    /// Defaults overridden by `AI_HTTP_*` and `AI_PROXY_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: env_secs("AI_HTTP_TIMEOUT_SECS").unwrap_or(defaults.timeout),
            connect_timeout: env_secs("AI_HTTP_CONNECT_TIMEOUT_SECS")
                .unwrap_or(defaults.connect_timeout),
            pool_max_idle_per_host: env::var("AI_HTTP_POOL_MAX_IDLE_PER_HOST")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout: env_secs("AI_HTTP_POOL_IDLE_TIMEOUT_SECS")
                .unwrap_or(defaults.pool_idle_timeout),
            proxy_url: env::var("AI_PROXY_URL").ok().filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// A pooled reqwest client plus cancellation-aware helpers.
///
/// Holds no per-call state, so one instance serves concurrent calls.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout))
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy_url {
            match Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy url"),
            }
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::http("transport.build", e))?;
        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Applies the total timeout to a request whose whole body is read at once.
    pub fn single_shot(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.timeout(self.timeout)
    }

    /// Sends `request`, aborting on cancellation or deadline.
    pub async fn send(
        &self,
        ctx: &CallContext,
        stage: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        ctx.check()?;
        let response = ctx
            .run(request.send())
            .await?
            .map_err(|e| TransportError::http(stage, e))?;
        Ok(response)
    }

    /// Reads the whole body as text under the call's cancellation.
    pub async fn read_text(
        &self,
        ctx: &CallContext,
        stage: &'static str,
        response: reqwest::Response,
    ) -> Result<String> {
        let text = ctx
            .run(response.text())
            .await?
            .map_err(|e| TransportError::http(stage, e))?;
        Ok(text)
    }
}

/// Pulls the next body chunk, or `None` at end of input.
pub async fn next_chunk<S>(ctx: &CallContext, stage: &'static str, body: &mut S) -> Result<Option<Bytes>>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    match ctx.run(body.next()).await? {
        Some(Ok(chunk)) => Ok(Some(chunk)),
        Some(Err(e)) => Err(TransportError::http(stage, e).into()),
        None => Ok(None),
    }
}

/// Trims `body` and cuts it to [`BODY_SNIPPET_LIMIT`] bytes on a char boundary.
pub fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_SNIPPET_LIMIT {
        return trimmed.to_string();
    }
    let mut end = BODY_SNIPPET_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{stage}: {source}")]
    Http {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{stage}: {message}")]
    Other { stage: &'static str, message: String },
}

impl TransportError {
    pub fn http(stage: &'static str, source: reqwest::Error) -> Self {
        Self::Http { stage, source }
    }

    pub fn other(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Other {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Http { stage, .. } | Self::Other { stage, .. } => stage,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http { source, .. } if source.is_timeout())
    }

    pub fn is_builder(&self) -> bool {
        matches!(self, Self::Http { source, .. } if source.is_builder())
    }
}
