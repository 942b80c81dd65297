use crate::utils::{get_env_flag, get_env_with_prefix};
use serde::{Deserialize, Serialize};

/// CSRF guard configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsrfConfig {
    /// Whether state-changing requests are checked at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Form field carrying the token in urlencoded bodies
    #[serde(default = "default_field_name")]
    pub field_name: String,

    /// Header carrying the token for script-driven submissions
    #[serde(default = "default_header_name")]
    pub header_name: String,

    /// Paths that skip the guard (exact match, or prefix when ending in `/`)
    ///
    /// Only for endpoints authenticated some other way, such as signed
    /// webhooks.
    #[serde(default)]
    pub exempt_paths: Vec<String>,

    /// Largest urlencoded body buffered while looking for the token
    #[serde(default = "default_max_form_bytes")]
    pub max_form_bytes: usize,

    /// Send the current masked token in a response header on safe requests
    #[serde(default = "default_expose_header")]
    pub expose_header: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            field_name: default_field_name(),
            header_name: default_header_name(),
            exempt_paths: Vec::new(),
            max_form_bytes: default_max_form_bytes(),
            expose_header: default_expose_header(),
        }
    }
}

impl CsrfConfig {
    pub fn builder() -> CsrfConfigBuilder {
        CsrfConfigBuilder::new()
    }

    /// Load CSRF configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.enabled = get_env_flag("CSRF_ENABLED", config.enabled);

        if let Some(field) = get_env_with_prefix("CSRF_FIELD_NAME") {
            config.field_name = field;
        }

        if let Some(header) = get_env_with_prefix("CSRF_HEADER_NAME") {
            config.header_name = header.to_lowercase();
        }

        if let Some(paths) = get_env_with_prefix("CSRF_EXEMPT_PATHS") {
            config.exempt_paths = paths
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }

        if let Some(max) = get_env_with_prefix("CSRF_MAX_FORM_BYTES") {
            if let Ok(bytes) = max.parse() {
                config.max_form_bytes = bytes;
            }
        }

        config.expose_header = get_env_flag("CSRF_EXPOSE_HEADER", config.expose_header);

        config
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|exempt| {
            if exempt.ends_with('/') {
                path.starts_with(exempt.as_str())
            } else {
                path == exempt
            }
        })
    }

    /// Add an exempt path unless it is already listed
    pub fn exempt(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.exempt_paths.contains(&path) {
            self.exempt_paths.push(path);
        }
    }
}

/// Builder for CsrfConfig
#[must_use = "builder does nothing until you call build()"]
pub struct CsrfConfigBuilder {
    config: CsrfConfig,
}

impl CsrfConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CsrfConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.config.field_name = name.into();
        self
    }

    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.config.header_name = name.into().to_lowercase();
        self
    }

    pub fn exempt_path(mut self, path: impl Into<String>) -> Self {
        self.config.exempt(path);
        self
    }

    pub fn max_form_bytes(mut self, bytes: usize) -> Self {
        self.config.max_form_bytes = bytes;
        self
    }

    pub fn expose_header(mut self, expose: bool) -> Self {
        self.config.expose_header = expose;
        self
    }

    pub fn build(self) -> CsrfConfig {
        self.config
    }
}

impl Default for CsrfConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_field_name() -> String {
    "authenticity_token".to_string()
}

fn default_header_name() -> String {
    "x-csrf-token".to_string()
}

fn default_max_form_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_expose_header() -> bool {
    true
}
