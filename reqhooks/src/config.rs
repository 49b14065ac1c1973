//! Configuration file parsing and structure definitions

use crate::error::ConfigError;
use crate::modules::ModuleRegistry;
use crate::modules::api_key_auth::ApiKeyAuthListener;
use crate::modules::request_log::RequestLog;
use crate::observability;
use crate::security::{ConsumerConfig, StaticKeyAuthenticator};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::util::TryInitError;

/// Top-level configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub auth: Option<AuthConfig>,
    pub request_log: Option<RequestLogConfig>,
    pub log_level: Option<String>, // trace, debug, info, warn, error
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthConfig {
    pub api_key: Option<ApiKeyConfig>,
}

/// API key listener configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ApiKeyConfig {
    pub enabled: Option<bool>,
    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
}

/// Request log module configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RequestLogConfig {
    pub enabled: Option<bool>,
    pub include_user: Option<bool>, // add `user` to records (default: true)
    pub token: Option<String>,       // fixed correlation token (default: generated per request)
    pub channel: Option<String>,     // record channel (default: "request")
}

impl Config {
    /// Read and parse configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Install the JSON log subscriber at the configured level
    pub fn init_logging(&self) -> Result<(), TryInitError> {
        observability::tracing::init_logging(self.log_level.as_deref())
    }

    /// Build the module chain: API key authentication, then request logging
    pub fn build_registry(&self) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();

        if let Some(api_key) = self.auth.as_ref().and_then(|a| a.api_key.as_ref())
            && api_key.enabled.unwrap_or(true)
        {
            tracing::debug!(
                consumers = api_key.consumers.len(),
                "Registering api key authentication"
            );
            let authenticator = StaticKeyAuthenticator::new(api_key.consumers.clone());
            registry = registry.with(Arc::new(ApiKeyAuthListener::new(Arc::new(authenticator))));
        }

        if let Some(request_log) = &self.request_log
            && request_log.enabled.unwrap_or(true)
        {
            registry = registry.with(Arc::new(RequestLog::new(request_log.clone())));
        }

        registry
    }
}
