use super::config::WebhookConfig;
use super::handler::{WebhookEvent, WebhookHandler, WebhookRouter};
use super::idempotency::{IdempotencyStore, MemoryIdempotencyStore};
use super::verification::{HmacSha256Verifier, WebhookVerifier};
use crate::error::{AlmonerError, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName},
    routing::post,
};
use serde_json::{Value, json};
use std::marker::PhantomData;
use std::sync::Arc;

/// Axum endpoint for signed payment webhooks
///
/// The body is taken as raw bytes and verified before any parsing. Accepted
/// deliveries are parsed into `E` and dispatched to the handler through a
/// [`WebhookRouter`], so redelivered event ids are acknowledged without being
/// processed twice.
///
/// | outcome                          | status |
/// |----------------------------------|--------|
/// | signature missing or wrong       | 403    |
/// | payload not parsable as `E`      | 400    |
/// | handler failed                   | 500    |
/// | handled or already processed     | 200    |
pub struct WebhookReceiver<E, H> {
    verifier: Arc<dyn WebhookVerifier>,
    handler: Arc<H>,
    idempotency: Arc<dyn IdempotencyStore>,
    router: WebhookRouter,
    signature_header: HeaderName,
    _event: PhantomData<fn() -> E>,
}

impl<E, H> Clone for WebhookReceiver<E, H> {
    fn clone(&self) -> Self {
        Self {
            verifier: self.verifier.clone(),
            handler: self.handler.clone(),
            idempotency: self.idempotency.clone(),
            router: WebhookRouter::new(),
            signature_header: self.signature_header.clone(),
            _event: PhantomData,
        }
    }
}

impl<E, H> WebhookReceiver<E, H>
where
    E: WebhookEvent + 'static,
    H: WebhookHandler<E> + 'static,
{
    /// Receiver using the configured secret, header and prefix, with an
    /// in-memory idempotency store
    pub fn new(config: &WebhookConfig, handler: H) -> Result<Self> {
        let signature_header = HeaderName::from_bytes(config.signature_header.as_bytes())
            .map_err(|e| {
                AlmonerError::config(format!(
                    "Invalid webhook signature header '{}': {}",
                    config.signature_header, e
                ))
            })?;

        let verifier = HmacSha256Verifier::from_secret(config.secret.clone())
            .with_prefix(config.signature_prefix.clone());

        Ok(Self {
            verifier: Arc::new(verifier),
            handler: Arc::new(handler),
            idempotency: Arc::new(MemoryIdempotencyStore::new()),
            router: WebhookRouter::new(),
            signature_header,
            _event: PhantomData,
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn WebhookVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_idempotency_store(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.idempotency = store;
        self
    }

    pub fn signature_header(&self) -> &HeaderName {
        &self.signature_header
    }

    /// Verify, parse and dispatch one delivery
    pub async fn receive(&self, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        let signature = headers
            .get(&self.signature_header)
            .and_then(|value| value.to_str().ok());

        self.verifier.verify_signature(body, signature)?;

        let event: E = serde_json::from_slice(body)?;

        self.router
            .process(&event, self.handler.as_ref(), self.idempotency.as_ref())
            .await
            .map_err(|e| match e {
                AlmonerError::BadRequest(_) => e,
                other => AlmonerError::internal(format!("Webhook handler failed: {}", other)),
            })
    }

    /// Router serving `POST path` with this receiver as state
    pub fn into_router(self, path: &str) -> Router {
        Router::new()
            .route(path, post(receive_webhook::<E, H>))
            .with_state(self)
    }
}

async fn receive_webhook<E, H>(
    State(receiver): State<WebhookReceiver<E, H>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>>
where
    E: WebhookEvent + 'static,
    H: WebhookHandler<E> + 'static,
{
    receiver.receive(&headers, &body).await?;
    Ok(Json(json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::{PaymentEvent, signature_header_value};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "test_verifier_token";

    #[derive(Default)]
    struct Counting {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl WebhookHandler<PaymentEvent> for Arc<Counting> {
        async fn handle(&self, _event: &PaymentEvent) -> Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl WebhookHandler<PaymentEvent> for Failing {
        async fn handle(&self, _event: &PaymentEvent) -> Result<()> {
            Err(AlmonerError::forbidden("ledger refused the entry"))
        }
    }

    fn config() -> WebhookConfig {
        WebhookConfig::default().with_secret(SECRET)
    }

    fn signed(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = signature_header_value(SECRET.as_bytes(), body).unwrap();
        headers.insert("x-gateway-signature", HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_signed_delivery_dispatched() {
        let counting = Arc::new(Counting::default());
        let receiver = WebhookReceiver::<PaymentEvent, _>::new(&config(), counting.clone()).unwrap();
        let body = br#"{"id":"evt_1","type":"payment.completed","data":{}}"#;

        receiver.receive(&signed(body), body).await.unwrap();
        receiver.receive(&signed(body), body).await.unwrap();

        assert_eq!(counting.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsigned_delivery_not_dispatched() {
        let counting = Arc::new(Counting::default());
        let receiver = WebhookReceiver::<PaymentEvent, _>::new(&config(), counting.clone()).unwrap();
        let body = br#"{"id":"evt_1"}"#;

        let err = receiver.receive(&HeaderMap::new(), body).await.unwrap_err();
        assert!(matches!(err, AlmonerError::SignatureInvalid));
        assert_eq!(counting.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_signed_garbage_is_bad_request() {
        let receiver =
            WebhookReceiver::<PaymentEvent, _>::new(&config(), Arc::new(Counting::default()))
                .unwrap();
        let body = b"not json at all";

        let err = receiver.receive(&signed(body), body).await.unwrap_err();
        assert!(matches!(err, AlmonerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_handler_failure_is_internal() {
        let receiver = WebhookReceiver::<PaymentEvent, _>::new(&config(), Failing).unwrap();
        let body = br#"{"id":"evt_9"}"#;

        let err = receiver.receive(&signed(body), body).await.unwrap_err();
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_header_name_is_config_error() {
        let config = WebhookConfig {
            signature_header: "bad header".to_string(),
            ..config()
        };
        let result = WebhookReceiver::<PaymentEvent, _>::new(&config, Failing);
        assert!(matches!(result, Err(AlmonerError::Config(_))));
    }
}
