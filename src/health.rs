use crate::app::AppContext;
use crate::traits::session::SessionStore;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = ComponentHealth> + Send + 'a>>;

pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> CheckFuture<'_>;
}

/// Always healthy while the process answers
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationCheck;

impl HealthCheck for ApplicationCheck {
    fn name(&self) -> &str {
        "application"
    }

    fn check(&self) -> CheckFuture<'_> {
        Box::pin(async {
            ComponentHealth::new(self.name(), HealthStatus::Healthy, "Application is running")
        })
    }
}

/// Unhealthy when the session backend cannot be reached; without sessions
/// every form submission fails the CSRF check
pub struct SessionStoreCheck {
    store: Arc<dyn SessionStore>,
}

impl SessionStoreCheck {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

impl HealthCheck for SessionStoreCheck {
    fn name(&self) -> &str {
        "sessions"
    }

    fn check(&self) -> CheckFuture<'_> {
        Box::pin(async {
            if self.store.is_healthy() {
                ComponentHealth::new(self.name(), HealthStatus::Healthy, "Session store reachable")
            } else {
                ComponentHealth::new(
                    self.name(),
                    HealthStatus::Unhealthy,
                    "Session store unavailable",
                )
            }
        })
    }
}

/// Degraded when no webhook secret is configured: the site serves pages but
/// rejects every payment notification
#[derive(Debug, Clone, Copy)]
pub struct WebhookSecretCheck {
    configured: bool,
}

impl WebhookSecretCheck {
    pub fn new(configured: bool) -> Self {
        Self { configured }
    }
}

impl HealthCheck for WebhookSecretCheck {
    fn name(&self) -> &str {
        "payment_webhooks"
    }

    fn check(&self) -> CheckFuture<'_> {
        Box::pin(async {
            if self.configured {
                ComponentHealth::new(self.name(), HealthStatus::Healthy, "Signing secret configured")
            } else {
                ComponentHealth::new(
                    self.name(),
                    HealthStatus::Degraded,
                    "Signing secret missing, deliveries are rejected",
                )
            }
        })
    }
}

/// Runs every registered check; the worst status wins
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checks: vec![Arc::new(ApplicationCheck)],
        }
    }

    /// Checks for everything the context wires together
    pub fn for_context(context: &AppContext) -> Self {
        Self::new()
            .with_check(Arc::new(SessionStoreCheck::new(context.sessions.clone())))
            .with_check(Arc::new(WebhookSecretCheck::new(context.webhook.has_secret())))
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let mut checks = Vec::with_capacity(self.checks.len());
        let mut overall_status = HealthStatus::Healthy;

        for check in &self.checks {
            let result = check.check().await;

            match result.status {
                HealthStatus::Unhealthy => overall_status = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall_status == HealthStatus::Healthy => {
                    overall_status = HealthStatus::Degraded
                }
                _ => {}
            }

            checks.push(result);
        }

        HealthResponse {
            status: overall_status,
            checks,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn health_handler(State(context): State<AppContext>) -> HealthResponse {
    HealthChecker::for_context(&context).check_health().await
}

pub fn health_routes() -> Router<AppContext> {
    Router::new().route("/health", get(health_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::WebhookConfig;

    #[tokio::test]
    async fn test_healthy_with_secret() {
        let context = AppContext::builder()
            .with_webhook(WebhookConfig::default().with_secret("whsec"))
            .build();
        let response = HealthChecker::for_context(&context).check_health().await;

        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.checks.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_secret_is_degraded() {
        let response = HealthChecker::for_context(&AppContext::new()).check_health().await;

        assert_eq!(response.status, HealthStatus::Degraded);
        let webhook = response
            .checks
            .iter()
            .find(|c| c.name == "payment_webhooks")
            .unwrap();
        assert_eq!(webhook.status, HealthStatus::Degraded);
        assert_eq!(response.into_response().status(), StatusCode::OK);
    }

    struct Down;

    impl HealthCheck for Down {
        fn name(&self) -> &str {
            "down"
        }

        fn check(&self) -> CheckFuture<'_> {
            Box::pin(async { ComponentHealth::new("down", HealthStatus::Unhealthy, "offline") })
        }
    }

    #[tokio::test]
    async fn test_unhealthy_wins() {
        let response = HealthChecker::new()
            .with_check(Arc::new(WebhookSecretCheck::new(false)))
            .with_check(Arc::new(Down))
            .check_health()
            .await;

        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert_eq!(
            response.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
