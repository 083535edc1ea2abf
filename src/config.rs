//! Provider configuration snapshot.
//!
//! A [`ProviderConfig`] is resolved once (explicitly or from the environment)
//! and handed to [`create_provider`](crate::drivers::create_provider). Nothing
//! here is read again during a call.

use crate::drivers::ProviderKind;
use crate::transport::TransportConfig;
use crate::{Error, ErrorContext, Result};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Credential-store service name used for API key lookup.
pub const KEYRING_SERVICE: &str = "ai-chat";

/// Some OpenAI-compatible gateways reject library user agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Where the manual REST client puts its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// `?key=<api key>` on the URL.
    #[default]
    ApiKey,
    /// `Authorization: Bearer <api key>`.
    AuthToken,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::AuthToken => "auth_token",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "api_key" => Ok(Self::ApiKey),
            "auth_token" => Ok(Self::AuthToken),
            other => Err(Error::configuration_with_context(
                format!("unsupported auth type {:?} (expected api_key or auth_token)", other),
                ErrorContext::new().with_field_path("auth_type"),
            )),
        }
    }
}

/// Immutable per-backend settings.
#[derive(Clone, Default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// Overrides the backend's default endpoint.
    pub base_url: Option<String>,
    pub auth_mode: AuthMode,
    /// Falls back to [`DEFAULT_USER_AGENT`].
    pub user_agent: Option<String>,
    pub transport: TransportConfig,
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves settings for `kind` from the process environment.
    ///
    /// | Setting | Source |
    /// |---------|--------|
    /// | API key | credential store (`ai-chat` / provider id), then `<PROVIDER>_API_KEY` |
    /// | base URL | `<PROVIDER>_BASE_URL` |
    /// | auth mode | `<PROVIDER>_AUTH_TYPE` |
    /// | transport | `AI_HTTP_*`, `AI_PROXY_URL` |
    pub fn from_env(kind: ProviderKind) -> Result<Self> {
        let prefix = kind.env_prefix();
        let auth_mode = match non_empty_env(&format!("{}_AUTH_TYPE", prefix)) {
            Some(raw) => raw.parse()?,
            None => AuthMode::default(),
        };
        Ok(Self {
            api_key: Self::lookup_api_key(kind),
            base_url: non_empty_env(&format!("{}_BASE_URL", prefix)),
            auth_mode,
            user_agent: non_empty_env("AI_USER_AGENT"),
            transport: TransportConfig::from_env(),
        })
    }

    fn lookup_api_key(kind: ProviderKind) -> Option<String> {
        #[cfg(feature = "credential-store")]
        {
            // 1. OS credential store
            if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, kind.as_str()) {
                if let Ok(key) = entry.get_password() {
                    if !key.trim().is_empty() {
                        return Some(key);
                    }
                }
            }
        }

        // 2. Environment variable (PROVIDER_API_KEY)
        non_empty_env(&format!("{}_API_KEY", kind.env_prefix()))
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// The API key, if set and not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("auth_mode", &self.auth_mode)
            .field("user_agent", &self.user_agent)
            .field("transport", &self.transport)
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
