//! almoner - request-security core for a server-rendered nonprofit site
//!
//! Built on Axum and Tokio. Two guards carry the weight:
//!
//! - **CSRF protection**: every POST, PUT, PATCH and DELETE must carry a token
//!   bound to the requester's session ([`csrf`]).
//! - **Signed payment webhooks**: the gateway's `X-Gateway-Signature` is an
//!   HMAC-SHA256 over the raw body, verified before anything is parsed
//!   ([`webhooks`]).
//!
//! Sessions, security headers, health checks, configuration and the
//! application shell around them follow the same conventions.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use almoner::{App, Config, webhooks::LogPaymentEvents};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     almoner::init_tracing();
//!
//!     // Fails when PAYMENT_WEBHOOK_SECRET is missing
//!     let config = Config::from_env()?;
//!
//!     App::with_config(config)
//!         .with_payment_webhooks(LogPaymentEvents)?
//!         .serve()
//!         .await?;
//!     Ok(())
//! }
//! ```

mod app;
mod config;
mod core;
pub mod csrf;
mod error;
pub mod health;
mod http;
mod middleware;
pub mod security;
pub mod session;
pub mod testing;
pub mod traits;
mod utils;
pub mod webhooks;

pub use app::{AppContext, AppContextBuilder};
pub use config::{Config, ConfigBuilder, LoggingConfig, ServerConfig};
pub use core::{App, AppBuilder};
pub use csrf::{CsrfConfig, CsrfLayer, CsrfToken};
pub use error::{AlmonerError, Result};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus};
pub use http::RouteModule;
pub use security::{SecurityConfig, SecurityConfigBuilder};
pub use session::{InMemorySessionStore, Session, SessionConfig, SessionLayer};
pub use traits::session::{SessionData, SessionStore};
pub use webhooks::{HmacSha256Verifier, WebhookConfig, WebhookReceiver, WebhookVerifier};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with `RUST_LOG` (default `info`)
///
/// Set `ALMONER_LOG_JSON=true` (or `LOG_JSON=true`) for JSON lines.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install_subscriber(env_filter, utils::get_env_flag("LOG_JSON", false));
}

/// Initialize tracing from the logging section of `config`
///
/// `RUST_LOG` still wins when set.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    install_subscriber(env_filter, config.logging.json);
}

fn install_subscriber(env_filter: EnvFilter, json: bool) {
    let registry = tracing_subscriber::registry().with(env_filter);

    // try_init: a subscriber may already be installed (tests, embedding)
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("almoner: tracing already initialized ({})", e);
    }
}
