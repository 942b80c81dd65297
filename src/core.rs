use crate::{
    app::AppContext,
    config::Config,
    csrf::build_csrf_layer,
    error::Result,
    health::health_routes,
    http::RouteModule,
    middleware::MakeRequestUuid,
    security::build_security_headers_layer,
    session::{SessionLayer, spawn_cleanup_task},
    webhooks::{PaymentEvent, WebhookEvent, WebhookHandler, WebhookReceiver},
};
use axum::{Router, extract::DefaultBodyLimit};
use std::time::Duration;
use tokio::signal;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// The site's HTTP application
///
/// Page routes registered through [`App::register_module`] sit behind the
/// session and CSRF layers. The payment webhook route is exempt from CSRF
/// and authenticated by its signature instead.
pub struct App {
    router: Router<AppContext>,
    config: Config,
    context: AppContext,
    /// Routers that carry their own state, merged after `with_state`
    extra_routers: Vec<Router>,
}

impl App {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// App whose context is derived from `config`
    pub fn with_config(config: Config) -> Self {
        let context = AppContext::from_config(&config);
        Self {
            router: health_routes(),
            config,
            context,
            extra_routers: Vec::new(),
        }
    }

    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.router = module.register(self.router);
        self
    }

    /// Merge a router whose state is already provided
    pub fn merge_router(mut self, router: Router) -> Self {
        self.extra_routers.push(router);
        self
    }

    pub fn with_context(mut self, context: AppContext) -> Self {
        self.context = context;
        self
    }

    /// Serve `receiver` at the configured webhook path
    pub fn with_webhook_receiver<E, H>(self, receiver: WebhookReceiver<E, H>) -> Self
    where
        E: WebhookEvent + 'static,
        H: WebhookHandler<E> + 'static,
    {
        let router = receiver.into_router(&self.context.webhook.path);
        self.merge_router(router)
    }

    /// Receive gateway payment events with `handler`, verified against the
    /// context's webhook configuration
    pub fn with_payment_webhooks<H>(self, handler: H) -> Result<Self>
    where
        H: WebhookHandler<PaymentEvent> + 'static,
    {
        let receiver = WebhookReceiver::<PaymentEvent, H>::new(&self.context.webhook, handler)?;
        Ok(self.with_webhook_receiver(receiver))
    }

    /// The fully layered router, ready to serve or to drive in tests
    ///
    /// Layers from outermost to innermost: body limit, security headers,
    /// request id, tracing, session, CSRF.
    pub fn into_router(self) -> Router {
        let mut router = self.router.with_state(self.context.clone());

        for extra in self.extra_routers {
            router = router.merge(extra);
        }

        if let Some(csrf_layer) = build_csrf_layer(&self.context.csrf) {
            router = router.layer(csrf_layer);
        }

        router = router.layer(SessionLayer::new(
            self.context.sessions.clone(),
            (*self.context.session_config).clone(),
        ));

        router = router.layer(TraceLayer::new_for_http());

        // Set must wrap Propagate so the generated id reaches the response
        router = router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        if let Some(security_layer) = build_security_headers_layer(&self.config.security) {
            router = router.layer(security_layer);
        }

        router.layer(DefaultBodyLimit::max(self.config.server.max_body_size))
    }

    /// Bind and serve until Ctrl+C or SIGTERM, sweeping expired sessions
    /// in the background
    pub async fn serve(self) -> std::io::Result<()> {
        let addr = self.config.server.addr().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid server address: {}", e),
            )
        })?;
        let webhook_path = self.context.webhook.path.clone();

        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("Server starting on http://{}", addr);
        tracing::info!("Health check available at http://{}/health", addr);
        tracing::info!(path = %webhook_path, "Payment webhooks accepted");

        let cleanup = self
            .context
            .session_config
            .cleanup_interval()
            .map(|every| spawn_cleanup_task(self.context.sessions.clone(), every));

        let served = axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(cleanup) = cleanup {
            cleanup.abort();
        }
        served
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for App with fluent API
#[must_use = "builder does nothing until you call build()"]
pub struct AppBuilder {
    config: Config,
    context: Option<AppContext>,
    modules: Vec<Router<AppContext>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            context: None,
            modules: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use an explicit context instead of one derived from the config
    pub fn with_context(mut self, context: AppContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.modules.push(module.register(Router::new()));
        self
    }

    pub fn build(self) -> App {
        let mut app = App::with_config(self.config);
        if let Some(context) = self.context {
            app.context = context;
        }

        for module_router in self.modules {
            app.router = app.router.merge(module_router);
        }

        app
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Grace period for in-flight requests
    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!("Shutdown complete");
}
