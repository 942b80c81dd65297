use std::sync::Arc;

use crate::config::Config;
use crate::csrf::CsrfConfig;
use crate::session::{InMemorySessionStore, SessionConfig};
use crate::traits::session::SessionStore;
use crate::webhooks::WebhookConfig;

/// Shared state handed to every handler and middleware
///
/// Built once at startup and passed in explicitly; nothing in the crate
/// reaches for process-wide globals.
#[derive(Clone)]
pub struct AppContext {
    pub sessions: Arc<dyn SessionStore>,
    pub session_config: Arc<SessionConfig>,
    pub csrf: Arc<CsrfConfig>,
    pub webhook: Arc<WebhookConfig>,
}

impl AppContext {
    /// Context with an in-memory session store and default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::new()
    }

    /// Context for the given configuration, with an in-memory session store
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .with_session_config(config.session.clone())
            .with_csrf(config.csrf.clone())
            .with_webhook(config.webhook.clone())
            .build()
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for AppContext
///
/// The webhook path is always added to the CSRF exempt list: the gateway
/// authenticates with a signature, not a session.
#[must_use = "builder does nothing until you call build()"]
pub struct AppContextBuilder {
    sessions: Option<Arc<dyn SessionStore>>,
    session_config: SessionConfig,
    csrf: CsrfConfig,
    webhook: WebhookConfig,
}

impl AppContextBuilder {
    pub fn new() -> Self {
        Self {
            sessions: None,
            session_config: SessionConfig::default(),
            csrf: CsrfConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn with_csrf(mut self, config: CsrfConfig) -> Self {
        self.csrf = config;
        self
    }

    pub fn with_webhook(mut self, config: WebhookConfig) -> Self {
        self.webhook = config;
        self
    }

    pub fn build(mut self) -> AppContext {
        self.csrf.exempt(self.webhook.path.clone());

        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));

        AppContext {
            sessions,
            session_config: Arc::new(self.session_config),
            csrf: Arc::new(self.csrf),
            webhook: Arc::new(self.webhook),
        }
    }
}

impl Default for AppContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_path_exempt_from_csrf() {
        let context = AppContext::new();
        assert!(context.csrf.is_exempt("/webhooks/payments"));
        assert!(!context.csrf.is_exempt("/donate"));
    }

    #[test]
    fn test_custom_webhook_path_exempt() {
        let webhook = WebhookConfig {
            path: "/gateway/notify".to_string(),
            ..Default::default()
        };
        let context = AppContext::builder().with_webhook(webhook).build();
        assert!(context.csrf.is_exempt("/gateway/notify"));
        assert!(!context.csrf.is_exempt("/webhooks/payments"));
    }

    #[tokio::test]
    async fn test_custom_session_store_is_shared() {
        let store = Arc::new(InMemorySessionStore::new());
        let context = AppContext::builder().with_sessions(store.clone()).build();

        let data = crate::traits::session::SessionData::new(std::time::Duration::from_secs(60));
        context.sessions.save("abc", data).await.unwrap();
        assert_eq!(store.len().await, 1);
    }
}
