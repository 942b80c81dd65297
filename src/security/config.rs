use crate::utils::{get_env_flag, get_env_with_prefix};
use serde::{Deserialize, Serialize};

/// X-Frame-Options header value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameOptions {
    #[default]
    Deny,
    SameOrigin,
}

impl FrameOptions {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deny => "DENY",
            Self::SameOrigin => "SAMEORIGIN",
        }
    }
}

/// Referrer-Policy header value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferrerPolicy {
    NoReferrer,
    SameOrigin,
    #[default]
    StrictOriginWhenCrossOrigin,
    StrictOrigin,
}

impl ReferrerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoReferrer => "no-referrer",
            Self::SameOrigin => "same-origin",
            Self::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
            Self::StrictOrigin => "strict-origin",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "no-referrer" => Some(Self::NoReferrer),
            "same-origin" => Some(Self::SameOrigin),
            "strict-origin-when-cross-origin" => Some(Self::StrictOriginWhenCrossOrigin),
            "strict-origin" => Some(Self::StrictOrigin),
            _ => None,
        }
    }
}

/// Response security headers for the public site and the back-office
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Strict-Transport-Security max age in seconds, 0 disables HSTS
    #[serde(default = "default_hsts_max_age")]
    pub hsts_max_age: u64,

    #[serde(default = "default_enabled")]
    pub hsts_include_subdomains: bool,

    /// X-Content-Type-Options: nosniff
    #[serde(default = "default_enabled")]
    pub nosniff: bool,

    /// None omits the header (e.g. when a CSP frame-ancestors rule is used)
    #[serde(default = "default_frame_options")]
    pub frame_options: Option<FrameOptions>,

    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: Option<ReferrerPolicy>,

    /// Content-Security-Policy value. The default restricts form
    /// submissions to this origin.
    #[serde(default = "default_content_security_policy")]
    pub content_security_policy: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            hsts_max_age: default_hsts_max_age(),
            hsts_include_subdomains: true,
            nosniff: true,
            frame_options: default_frame_options(),
            referrer_policy: default_referrer_policy(),
            content_security_policy: default_content_security_policy(),
        }
    }
}

impl SecurityConfig {
    pub fn builder() -> SecurityConfigBuilder {
        SecurityConfigBuilder::new()
    }

    /// Load security header configuration from environment variables
    ///
    /// `SECURITY_CSP`, `SECURITY_FRAME_OPTIONS` and `SECURITY_REFERRER_POLICY`
    /// accept `off` to omit the header.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.enabled = get_env_flag("SECURITY_ENABLED", config.enabled);
        config.hsts_include_subdomains =
            get_env_flag("SECURITY_HSTS_INCLUDE_SUBDOMAINS", config.hsts_include_subdomains);
        config.nosniff = get_env_flag("SECURITY_NOSNIFF", config.nosniff);

        if let Some(max_age) = get_env_with_prefix("SECURITY_HSTS_MAX_AGE") {
            match max_age.parse() {
                Ok(age) => config.hsts_max_age = age,
                Err(_) => tracing::warn!(value = %max_age, "Ignoring invalid SECURITY_HSTS_MAX_AGE"),
            }
        }

        if let Some(frame) = get_env_with_prefix("SECURITY_FRAME_OPTIONS") {
            config.frame_options = match frame.to_uppercase().as_str() {
                "OFF" => None,
                "SAMEORIGIN" => Some(FrameOptions::SameOrigin),
                _ => Some(FrameOptions::Deny),
            };
        }

        if let Some(referrer) = get_env_with_prefix("SECURITY_REFERRER_POLICY") {
            config.referrer_policy = if referrer.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(ReferrerPolicy::parse(&referrer).unwrap_or_default())
            };
        }

        if let Some(csp) = get_env_with_prefix("SECURITY_CSP") {
            config.content_security_policy = if csp.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(csp)
            };
        }

        config
    }

    /// Value for Strict-Transport-Security, None when disabled
    pub fn hsts_value(&self) -> Option<String> {
        if self.hsts_max_age == 0 {
            return None;
        }
        let mut value = format!("max-age={}", self.hsts_max_age);
        if self.hsts_include_subdomains {
            value.push_str("; includeSubDomains");
        }
        Some(value)
    }
}

#[must_use = "builder does nothing until you call build()"]
pub struct SecurityConfigBuilder {
    config: SecurityConfig,
}

impl SecurityConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SecurityConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn hsts_max_age(mut self, seconds: u64) -> Self {
        self.config.hsts_max_age = seconds;
        self
    }

    pub fn frame_options(mut self, options: Option<FrameOptions>) -> Self {
        self.config.frame_options = options;
        self
    }

    pub fn referrer_policy(mut self, policy: Option<ReferrerPolicy>) -> Self {
        self.config.referrer_policy = policy;
        self
    }

    pub fn content_security_policy(mut self, csp: Option<String>) -> Self {
        self.config.content_security_policy = csp;
        self
    }

    pub fn build(self) -> SecurityConfig {
        self.config
    }
}

impl Default for SecurityConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_hsts_max_age() -> u64 {
    31_536_000 // 1 year
}

fn default_frame_options() -> Option<FrameOptions> {
    Some(FrameOptions::Deny)
}

fn default_referrer_policy() -> Option<ReferrerPolicy> {
    Some(ReferrerPolicy::default())
}

fn default_content_security_policy() -> Option<String> {
    Some("default-src 'self'; form-action 'self'; frame-ancestors 'none'".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SecurityConfig::default();
        assert!(config.enabled);
        assert_eq!(config.frame_options, Some(FrameOptions::Deny));
        assert!(
            config
                .content_security_policy
                .as_deref()
                .is_some_and(|csp| csp.contains("form-action 'self'"))
        );
    }

    #[test]
    fn test_hsts_value() {
        let config = SecurityConfig::default();
        assert_eq!(
            config.hsts_value().as_deref(),
            Some("max-age=31536000; includeSubDomains")
        );

        let config = SecurityConfig::builder().hsts_max_age(0).build();
        assert_eq!(config.hsts_value(), None);
    }

    #[test]
    fn test_referrer_policy_parse() {
        assert_eq!(ReferrerPolicy::parse("No-Referrer"), Some(ReferrerPolicy::NoReferrer));
        assert_eq!(ReferrerPolicy::parse("bogus"), None);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SecurityConfig::builder()
            .frame_options(Some(FrameOptions::SameOrigin))
            .referrer_policy(None)
            .content_security_policy(None)
            .build();
        assert_eq!(config.frame_options.map(|f| f.as_str()), Some("SAMEORIGIN"));
        assert!(config.referrer_policy.is_none());
        assert!(config.content_security_policy.is_none());
    }
}
