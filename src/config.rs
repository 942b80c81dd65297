use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::csrf::CsrfConfig;
use crate::error::{AlmonerError, Result};
use crate::security::SecurityConfig;
use crate::session::SessionConfig;
use crate::utils::{get_env_flag, get_env_with_prefix};
use crate::webhooks::WebhookConfig;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub csrf: CsrfConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Load and validate configuration from the environment
    pub fn from_env() -> Result<Self> {
        ConfigBuilder::new().from_env().build()
    }

    /// Check every section, failing on the first problem
    ///
    /// A missing payment webhook secret is an error unless
    /// `webhook.allow_missing_secret` is set.
    pub fn validate(&self) -> Result<()> {
        self.server.addr().map_err(|e| {
            AlmonerError::config(format!(
                "Invalid server address {}:{} - {}",
                self.server.host, self.server.port, e
            ))
        })?;

        if self.server.port == 0 {
            return Err(AlmonerError::config("Server port must be greater than 0"));
        }

        if self.server.max_body_size == 0 {
            return Err(AlmonerError::config("Maximum body size must be greater than 0"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AlmonerError::config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        if self.csrf.enabled && self.csrf.max_form_bytes == 0 {
            return Err(AlmonerError::config(
                "CSRF max_form_bytes must be greater than 0 when enabled",
            ));
        }

        if self.session.cookie_name.is_empty() {
            return Err(AlmonerError::config("Session cookie name must not be empty"));
        }

        self.webhook.validate()
    }
}

/// Builder for Config
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.server.max_body_size = max_body_size;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.config.security = security;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    pub fn with_csrf(mut self, csrf: CsrfConfig) -> Self {
        self.config.csrf = csrf;
        self
    }

    pub fn with_webhook(mut self, webhook: WebhookConfig) -> Self {
        self.config.webhook = webhook;
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.webhook = self.config.webhook.with_secret(secret);
        self
    }

    /// Overlay settings from `ALMONER_*` (or bare) environment variables
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        // ALMONER_PORT wins, PORT is what most platforms set
        if let Some(port) = get_env_with_prefix("PORT") {
            match port.parse() {
                Ok(p) => self.config.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
        if let Some(size) = get_env_with_prefix("MAX_BODY_SIZE") {
            if let Ok(size) = size.parse() {
                self.config.server.max_body_size = size;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        self.config.logging.json = get_env_flag("LOG_JSON", self.config.logging.json);

        self.config.security = SecurityConfig::from_env();
        self.config.session = SessionConfig::from_env();
        self.config.csrf = CsrfConfig::from_env();
        self.config.webhook = WebhookConfig::from_env();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns [`AlmonerError::Config`] for an invalid address or log level,
    /// a zero body limit, or a missing webhook secret (see
    /// [`Config::validate`]).
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build without validation, for tests and tooling
    pub fn build_unchecked(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
