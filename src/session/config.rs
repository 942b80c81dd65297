use crate::utils::{get_env_flag, get_env_with_prefix};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SameSite attribute for the session cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<SameSitePolicy> for cookie::SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Strict => cookie::SameSite::Strict,
            SameSitePolicy::Lax => cookie::SameSite::Lax,
            SameSitePolicy::None => cookie::SameSite::None,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Session TTL (in seconds)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Name of the cookie carrying the session id
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default)]
    pub cookie_domain: Option<String>,

    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Only send the cookie over HTTPS
    #[serde(default = "default_secure")]
    pub cookie_secure: bool,

    #[serde(default = "default_http_only")]
    pub cookie_http_only: bool,

    #[serde(default)]
    pub same_site: SameSitePolicy,

    /// Seconds between sweeps of expired sessions; 0 turns the sweep off
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            cookie_name: default_cookie_name(),
            cookie_domain: None,
            cookie_path: default_cookie_path(),
            cookie_secure: default_secure(),
            cookie_http_only: default_http_only(),
            same_site: SameSitePolicy::default(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

impl SessionConfig {
    /// Load session configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ttl) = get_env_with_prefix("SESSION_TTL_SECONDS") {
            if let Ok(seconds) = ttl.parse() {
                config.ttl_seconds = seconds;
            }
        }

        if let Some(name) = get_env_with_prefix("SESSION_COOKIE_NAME") {
            config.cookie_name = name;
        }

        if let Some(domain) = get_env_with_prefix("SESSION_COOKIE_DOMAIN") {
            config.cookie_domain = Some(domain);
        }

        if let Some(path) = get_env_with_prefix("SESSION_COOKIE_PATH") {
            config.cookie_path = path;
        }

        config.cookie_secure = get_env_flag("SESSION_COOKIE_SECURE", config.cookie_secure);
        config.cookie_http_only = get_env_flag("SESSION_COOKIE_HTTP_ONLY", config.cookie_http_only);

        if let Some(same_site) = get_env_with_prefix("SESSION_SAME_SITE") {
            config.same_site = match same_site.to_lowercase().as_str() {
                "strict" => SameSitePolicy::Strict,
                "none" => SameSitePolicy::None,
                _ => SameSitePolicy::Lax,
            };
        }

        if let Some(interval) = get_env_with_prefix("SESSION_CLEANUP_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse() {
                config.cleanup_interval_seconds = seconds;
            }
        }

        config
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Interval between expired-session sweeps, if enabled
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_seconds > 0).then(|| Duration::from_secs(self.cleanup_interval_seconds))
    }
}

fn default_ttl_seconds() -> u64 {
    3600 * 24 * 14
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_cookie_name() -> String {
    "sess".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_secure() -> bool {
    true
}

fn default_http_only() -> bool {
    true
}
