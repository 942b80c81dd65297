use super::idempotency::IdempotencyStore;
use crate::error::{AlmonerError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Trait representing a webhook event
pub trait WebhookEvent: DeserializeOwned + Send + Sync {
    /// Unique event ID for idempotency checking; empty if the sender
    /// supplies none
    fn event_id(&self) -> &str;

    fn event_type(&self) -> &str;
}

/// Downstream processing of a verified webhook event
///
/// # Example
///
/// ```rust,ignore
/// struct RecordDonation {
///     ledger: Ledger,
/// }
///
/// #[async_trait]
/// impl WebhookHandler<PaymentEvent> for RecordDonation {
///     async fn handle(&self, event: &PaymentEvent) -> Result<()> {
///         if event.event_type == "payment.completed" {
///             self.ledger.record(&event.data).await?;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait WebhookHandler<E: WebhookEvent>: Send + Sync {
    async fn handle(&self, event: &E) -> Result<()>;

    /// Optional: reject an event before handling
    async fn validate(&self, _event: &E) -> Result<()> {
        Ok(())
    }

    /// Optional: react to a failed `handle`
    async fn on_error(&self, event: &E, error: &AlmonerError) {
        tracing::error!(
            event_id = event.event_id(),
            event_type = event.event_type(),
            error = %error,
            "Webhook processing failed"
        );
    }
}

/// Dispatches verified events to a handler, skipping redeliveries
#[derive(Debug, Default)]
pub struct WebhookRouter;

impl WebhookRouter {
    pub fn new() -> Self {
        Self
    }

    /// Process a webhook event with the given handler
    ///
    /// The event id is claimed before the handler runs, so concurrent
    /// redeliveries of one event are handled once; the claim is released if
    /// processing fails. Events without an id are always handled.
    pub async fn process<E, H>(
        &self,
        event: &E,
        handler: &H,
        idempotency_store: &dyn IdempotencyStore,
    ) -> Result<()>
    where
        E: WebhookEvent,
        H: WebhookHandler<E> + ?Sized,
    {
        let event_id = event.event_id();
        let claimed = !event_id.is_empty();

        if claimed && !idempotency_store.try_mark(event_id.to_string()).await? {
            tracing::debug!(event_id, "Skipping already processed event");
            return Ok(());
        }

        let result = async {
            handler.validate(event).await?;
            if let Err(e) = handler.handle(event).await {
                handler.on_error(event, &e).await;
                return Err(e);
            }
            Ok::<(), AlmonerError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    event_id,
                    event_type = event.event_type(),
                    "Webhook processed successfully"
                );
                Ok(())
            }
            Err(e) => {
                if claimed {
                    idempotency_store.unmark(event_id).await?;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::{MemoryIdempotencyStore, PaymentEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        handled: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WebhookHandler<PaymentEvent> for CountingHandler {
        async fn handle(&self, _event: &PaymentEvent) -> Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AlmonerError::internal("ledger unavailable"));
            }
            Ok(())
        }
    }

    struct RejectRefunds;

    #[async_trait]
    impl WebhookHandler<PaymentEvent> for RejectRefunds {
        async fn handle(&self, _event: &PaymentEvent) -> Result<()> {
            Ok(())
        }

        async fn validate(&self, event: &PaymentEvent) -> Result<()> {
            if event.event_type == "payment.refunded" {
                return Err(AlmonerError::bad_request("refunds are handled manually"));
            }
            Ok(())
        }
    }

    fn event(id: &str, event_type: &str) -> PaymentEvent {
        PaymentEvent {
            id: id.to_string(),
            event_type: event_type.to_string(),
            data: serde_json::json!({"amount": 2500, "currency": "usd"}),
        }
    }

    #[tokio::test]
    async fn test_redelivery_is_skipped() {
        let router = WebhookRouter::new();
        let store = MemoryIdempotencyStore::new();
        let handler = CountingHandler::default();
        let evt = event("evt_1", "payment.completed");

        router.process(&evt, &handler, &store).await.unwrap();
        router.process(&evt, &handler, &store).await.unwrap();

        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        assert!(store.is_processed("evt_1").await.unwrap());
    }

    struct SlowHandler {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl WebhookHandler<PaymentEvent> for SlowHandler {
        async fn handle(&self, _event: &PaymentEvent) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_redeliveries_handled_once() {
        let router = WebhookRouter::new();
        let store = MemoryIdempotencyStore::new();
        let handler = SlowHandler {
            handled: AtomicUsize::new(0),
        };
        let evt = event("evt_9", "payment.completed");

        let (first, second) = tokio::join!(
            router.process(&evt, &handler, &store),
            router.process(&evt, &handler, &store),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        assert!(store.is_processed("evt_9").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_event_is_handled_on_redelivery() {
        let router = WebhookRouter::new();
        let store = MemoryIdempotencyStore::new();
        let failing = CountingHandler {
            fail: true,
            ..Default::default()
        };
        let working = CountingHandler::default();
        let evt = event("evt_4", "payment.completed");

        router.process(&evt, &failing, &store).await.unwrap_err();
        router.process(&evt, &working, &store).await.unwrap();

        assert_eq!(working.handled.load(Ordering::SeqCst), 1);
        assert!(store.is_processed("evt_4").await.unwrap());
    }

    #[tokio::test]
    async fn test_events_without_id_always_handled() {
        let router = WebhookRouter::new();
        let store = MemoryIdempotencyStore::new();
        let handler = CountingHandler::default();
        let evt = event("", "payment.completed");

        router.process(&evt, &handler, &store).await.unwrap();
        router.process(&evt, &handler, &store).await.unwrap();

        assert_eq!(handler.handled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_event_not_marked_processed() {
        let router = WebhookRouter::new();
        let store = MemoryIdempotencyStore::new();
        let handler = CountingHandler {
            fail: true,
            ..Default::default()
        };
        let evt = event("evt_2", "payment.completed");

        let err = router.process(&evt, &handler, &store).await.unwrap_err();
        assert!(matches!(err, AlmonerError::Internal(_)));
        assert!(!store.is_processed("evt_2").await.unwrap());
    }

    #[tokio::test]
    async fn test_validation_failure_skips_handle() {
        let router = WebhookRouter::new();
        let store = MemoryIdempotencyStore::new();
        let evt = event("evt_3", "payment.refunded");

        let err = router.process(&evt, &RejectRefunds, &store).await.unwrap_err();
        assert!(matches!(err, AlmonerError::BadRequest(_)));
        assert!(!store.is_processed("evt_3").await.unwrap());
    }
}
