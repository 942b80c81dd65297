use super::handler::{WebhookEvent, WebhookHandler};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Envelope the payment gateway posts for every notification
///
/// Only the envelope is typed. `data` is handed through untouched so gateway
/// schema additions never break deserialization.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentEvent {
    #[serde(default)]
    pub id: String,

    #[serde(default, rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

impl WebhookEvent for PaymentEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }
}

/// Handler that records each verified payment event in the log
///
/// Used by the standalone binary until the donation ledger is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPaymentEvents;

#[async_trait]
impl WebhookHandler<PaymentEvent> for LogPaymentEvents {
    async fn handle(&self, event: &PaymentEvent) -> Result<()> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Payment event received"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gateway_envelope() {
        let event: PaymentEvent = serde_json::from_str(
            r#"{"id":"evt_42","type":"payment.completed","data":{"amount":5000}}"#,
        )
        .unwrap();

        assert_eq!(event.event_id(), "evt_42");
        assert_eq!(event.event_type(), "payment.completed");
        assert_eq!(event.data["amount"], 5000);
    }

    #[test]
    fn test_missing_envelope_fields_default() {
        let event: PaymentEvent = serde_json::from_str(r#"{"test":"data"}"#).unwrap();
        assert_eq!(event.event_id(), "");
        assert_eq!(event.event_type(), "");
        assert!(event.data.is_null());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(serde_json::from_str::<PaymentEvent>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<PaymentEvent>("not json").is_err());
    }
}
