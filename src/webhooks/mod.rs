//! Signed payment webhooks.
//!
//! The gateway signs each delivery with `HMAC-SHA256(secret, body)` and sends
//! the hex digest as `X-Gateway-Signature: sha256=<hex>`. [`WebhookReceiver`]
//! verifies the byte-exact body before parsing, then hands the typed event to
//! a [`WebhookHandler`]. A missing secret rejects every delivery.

mod config;
mod event;
mod handler;
mod idempotency;
mod receiver;
mod verification;

pub use config::WebhookConfig;
pub use event::{LogPaymentEvents, PaymentEvent};
pub use handler::{WebhookEvent, WebhookHandler, WebhookRouter};
pub use idempotency::{DEFAULT_IDEMPOTENCY_CAPACITY, IdempotencyStore, MemoryIdempotencyStore};
pub use receiver::WebhookReceiver;
pub use verification::{
    DEFAULT_SIGNATURE_PREFIX, HmacSha256Verifier, WebhookVerifier, compute_signature,
    signature_header_value,
};
