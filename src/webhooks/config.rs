use super::verification::DEFAULT_SIGNATURE_PREFIX;
use crate::error::{AlmonerError, Result};
use crate::utils::{get_env_flag, get_env_with_prefix};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payment webhook configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Route the gateway posts to
    #[serde(default = "default_path")]
    pub path: String,

    /// Header carrying the signature
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Prefix in front of the hex digest
    #[serde(default = "default_signature_prefix")]
    pub signature_prefix: String,

    /// Shared HMAC secret. Only ever read from the environment.
    #[serde(skip)]
    pub secret: Option<Arc<SecretString>>,

    /// Start even without a secret (development only). Webhooks are still
    /// rejected; this only turns the startup failure into a logged error.
    #[serde(default)]
    pub allow_missing_secret: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            signature_header: default_signature_header(),
            signature_prefix: default_signature_prefix(),
            secret: None,
            allow_missing_secret: false,
        }
    }
}

impl WebhookConfig {
    /// Load webhook configuration from environment variables
    ///
    /// The secret comes from `ALMONER_PAYMENT_WEBHOOK_SECRET` or
    /// `PAYMENT_WEBHOOK_SECRET`; an empty value counts as unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(path) = get_env_with_prefix("WEBHOOK_PATH") {
            config.path = path;
        }

        if let Some(header) = get_env_with_prefix("WEBHOOK_SIGNATURE_HEADER") {
            config.signature_header = header.to_lowercase();
        }

        if let Some(prefix) = get_env_with_prefix("WEBHOOK_SIGNATURE_PREFIX") {
            config.signature_prefix = prefix;
        }

        if let Some(secret) = get_env_with_prefix("PAYMENT_WEBHOOK_SECRET") {
            config = config.with_secret(secret);
        }

        config.allow_missing_secret =
            get_env_flag("WEBHOOK_ALLOW_MISSING_SECRET", config.allow_missing_secret);

        config
    }

    /// Set the shared secret; an empty string clears it
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.secret = if secret.is_empty() {
            None
        } else {
            Some(Arc::new(SecretString::from(secret)))
        };
        self
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Fail loudly when no secret is configured
    pub fn validate(&self) -> Result<()> {
        if self.has_secret() {
            return Ok(());
        }

        if self.allow_missing_secret {
            tracing::error!(
                "PAYMENT_WEBHOOK_SECRET is not set; every payment webhook will be rejected"
            );
            return Ok(());
        }

        Err(AlmonerError::config(
            "PAYMENT_WEBHOOK_SECRET is not set. Payment webhooks cannot be verified. \
            Set it to the secret shown in the gateway dashboard, or set \
            WEBHOOK_ALLOW_MISSING_SECRET=true to start anyway with webhooks rejected.",
        ))
    }
}

fn default_path() -> String {
    "/webhooks/payments".to_string()
}

fn default_signature_header() -> String {
    "x-gateway-signature".to_string()
}

fn default_signature_prefix() -> String {
    DEFAULT_SIGNATURE_PREFIX.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WebhookConfig::default();
        assert_eq!(config.path, "/webhooks/payments");
        assert_eq!(config.signature_header, "x-gateway-signature");
        assert_eq!(config.signature_prefix, "sha256=");
        assert!(!config.has_secret());
    }

    #[test]
    fn test_validate_requires_secret() {
        let config = WebhookConfig::default();
        assert!(matches!(config.validate(), Err(AlmonerError::Config(_))));

        let config = WebhookConfig::default().with_secret("whsec_123");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_allow_missing_secret_starts_but_has_no_secret() {
        let config = WebhookConfig {
            allow_missing_secret: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(!config.has_secret());
    }

    #[test]
    fn test_empty_secret_counts_as_unset() {
        let config = WebhookConfig::default().with_secret("");
        assert!(!config.has_secret());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = WebhookConfig::default().with_secret("super-secret-value");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-value"));
    }

    #[test]
    fn test_secret_not_serialized() {
        let config = WebhookConfig::default().with_secret("super-secret-value");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret-value"));
        assert!(!json.contains("\"secret\""));
    }
}
