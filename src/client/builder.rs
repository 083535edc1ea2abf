use crate::client::ChatClient;
use crate::config::{AuthMode, ProviderConfig};
use crate::drivers::{create_provider_for, ProviderKind};
use crate::transport::TransportConfig;
use crate::Result;
use std::time::Duration;

/// Builder for [`ChatClient`].
///
/// Without an explicit [`ProviderConfig`] the configuration is resolved from
/// the environment for the chosen provider; individual setters then override it.
#[derive(Debug, Default)]
pub struct ChatClientBuilder {
    provider: String,
    config: Option<ProviderConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    auth_mode: Option<AuthMode>,
    user_agent: Option<String>,
    transport: Option<TransportConfig>,
    call_timeout: Option<Duration>,
}

impl ChatClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend name (`ollama`, `openai`, `gemini`; case-insensitive, empty means `ollama`).
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.provider = name.into();
        self
    }

    /// Use this configuration instead of reading the environment.
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override base URL (primarily for testing with mock servers)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = Some(mode);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Deadline applied to calls made through [`ChatClient::chat`].
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ChatClient> {
        let kind: ProviderKind = self.provider.parse()?;
        let mut config = match self.config {
            Some(config) => config,
            None => ProviderConfig::from_env(kind)?,
        };
        if let Some(key) = self.api_key {
            config.api_key = Some(key);
        }
        if let Some(url) = self.base_url {
            config.base_url = Some(url);
        }
        if let Some(mode) = self.auth_mode {
            config.auth_mode = mode;
        }
        if let Some(agent) = self.user_agent {
            config.user_agent = Some(agent);
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }

        let provider = create_provider_for(kind, config)?;
        Ok(ChatClient::new(provider).with_default_timeout(self.call_timeout))
    }
}
