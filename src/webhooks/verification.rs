use crate::error::{AlmonerError, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Trait for verifying webhook signatures
///
/// Verification is a pure predicate over the raw body and the signature
/// header; it never reads or alters the body stream.
pub trait WebhookVerifier: Send + Sync {
    /// Accept or reject a delivery
    ///
    /// # Arguments
    ///
    /// * `payload` - The raw webhook body, byte-exact as received
    /// * `signature` - The signature header value, `None` if absent
    ///
    /// Returns [`AlmonerError::SignatureInvalid`] on any rejection.
    fn verify_signature(&self, payload: &[u8], signature: Option<&str>) -> Result<()>;
}

/// HMAC-SHA256 webhook verifier with timing-safe comparison
///
/// The gateway sends `X-Gateway-Signature: sha256=<hex digest>` where the
/// digest is `HMAC-SHA256(secret, body)`.
///
/// A verifier without a secret (or with an empty one) rejects every
/// delivery. There is no fallback key.
///
/// # Example
///
/// ```rust,ignore
/// use almoner::webhooks::{HmacSha256Verifier, WebhookVerifier};
///
/// let verifier = HmacSha256Verifier::new("whsec_from_the_gateway");
/// verifier.verify_signature(body, headers.get("x-gateway-signature"))?;
/// ```
pub struct HmacSha256Verifier {
    secret: Option<Arc<SecretString>>,
    /// Prefix the signature must carry (e.g. "sha256=")
    signature_prefix: Option<String>,
}

impl HmacSha256Verifier {
    /// Verifier for `sha256=`-prefixed hex signatures
    pub fn new(secret: impl Into<String>) -> Self {
        Self::from_secret(Some(Arc::new(SecretString::from(secret.into()))))
            .with_prefix(DEFAULT_SIGNATURE_PREFIX)
    }

    /// Verifier built from an optional shared secret
    pub fn from_secret(secret: Option<Arc<SecretString>>) -> Self {
        Self {
            secret,
            signature_prefix: None,
        }
    }

    /// Require signatures to start with `prefix`; an empty prefix means bare hex
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.signature_prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn has_secret(&self) -> bool {
        self.usable_secret().is_some()
    }

    fn usable_secret(&self) -> Option<&str> {
        self.secret
            .as_deref()
            .map(|secret| secret.expose_secret())
            .filter(|secret| !secret.is_empty())
    }

    /// Strip the required prefix and decode the hex digest
    fn decode_signature(&self, signature: &str) -> Option<Vec<u8>> {
        let digest = match self.signature_prefix {
            Some(ref prefix) => signature.strip_prefix(prefix.as_str())?,
            None => signature,
        };
        hex::decode(digest).ok()
    }
}

/// Prefix the payment gateway puts in front of its hex digest
pub const DEFAULT_SIGNATURE_PREFIX: &str = "sha256=";

/// Compute `HMAC-SHA256(secret, payload)` as lowercase hex
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AlmonerError::internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// The header value a sender holding `secret` would attach to `payload`
pub fn signature_header_value(secret: &[u8], payload: &[u8]) -> Result<String> {
    Ok(format!(
        "{}{}",
        DEFAULT_SIGNATURE_PREFIX,
        compute_signature(secret, payload)?
    ))
}

/// Constant-time comparison, `subtle` keeps the optimizer from adding
/// early exits
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

impl WebhookVerifier for HmacSha256Verifier {
    fn verify_signature(&self, payload: &[u8], signature: Option<&str>) -> Result<()> {
        let Some(secret) = self.usable_secret() else {
            tracing::warn!("Webhook secret not configured, rejecting delivery");
            return Err(AlmonerError::SignatureInvalid);
        };

        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::debug!("Webhook signature header missing");
            return Err(AlmonerError::SignatureInvalid);
        };

        let Some(provided) = self.decode_signature(signature) else {
            tracing::debug!("Failed to decode webhook signature");
            return Err(AlmonerError::SignatureInvalid);
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AlmonerError::SignatureInvalid)?;
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        if !constant_time_compare(&expected, &provided) {
            tracing::debug!("Webhook signature verification failed");
            return Err(AlmonerError::SignatureInvalid);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rejected(result: Result<()>) {
        assert!(matches!(result, Err(AlmonerError::SignatureInvalid)));
    }

    // ============ constant_time_compare tests ============

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(&[], &[]));
        assert!(constant_time_compare(&[1, 2, 3], &[1, 2, 3]));
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_compare(&[1, 2], &[1, 2, 3]));
    }

    // ============ signature helpers ============

    #[test]
    fn test_compute_signature_known_vector() {
        // RFC 4231 test case 2
        let digest = compute_signature(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            digest,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signature_header_value_has_prefix() {
        let header = signature_header_value(b"secret", b"body").unwrap();
        assert!(header.starts_with("sha256="));
        assert_eq!(header.len(), "sha256=".len() + 64);
    }

    // ============ verification ============

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"test":"data"}"#;
        let verifier = HmacSha256Verifier::new("test_verifier_token");
        let header = signature_header_value(b"test_verifier_token", body).unwrap();

        assert!(verifier.verify_signature(body, Some(&header)).is_ok());
    }

    #[test]
    fn test_deadbeef_rejected() {
        let verifier = HmacSha256Verifier::new("test_verifier_token");
        assert_rejected(verifier.verify_signature(br#"{"test":"data"}"#, Some("sha256=deadbeef")));
    }

    #[test]
    fn test_modified_body_rejected() {
        let verifier = HmacSha256Verifier::new("secret");
        let header = signature_header_value(b"secret", b"original payload").unwrap();
        assert_rejected(verifier.verify_signature(b"modified payload", Some(&header)));
    }

    #[test]
    fn test_changed_secret_rejected() {
        let body = b"donation.completed";
        let header = signature_header_value(b"old-secret", body).unwrap();

        let verifier = HmacSha256Verifier::new("new-secret");
        assert_rejected(verifier.verify_signature(body, Some(&header)));
    }

    #[test]
    fn test_missing_header_rejected() {
        let verifier = HmacSha256Verifier::new("secret");
        assert_rejected(verifier.verify_signature(b"payload", None));
        assert_rejected(verifier.verify_signature(b"payload", Some("")));
        assert_rejected(verifier.verify_signature(b"payload", Some("   ")));
    }

    #[test]
    fn test_missing_prefix_rejected() {
        let body = b"payload";
        let bare = compute_signature(b"secret", body).unwrap();
        let verifier = HmacSha256Verifier::new("secret");
        assert_rejected(verifier.verify_signature(body, Some(&bare)));
    }

    #[test]
    fn test_bare_hex_when_no_prefix_configured() {
        let body = b"payload";
        let bare = compute_signature(b"secret", body).unwrap();
        let verifier = HmacSha256Verifier::new("secret").with_prefix("");
        assert!(verifier.verify_signature(body, Some(&bare)).is_ok());
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let body = b"payload";
        let digest = compute_signature(b"secret", body).unwrap().to_uppercase();
        let verifier = HmacSha256Verifier::new("secret");
        assert!(verifier.verify_signature(body, Some(&format!("sha256={}", digest))).is_ok());
    }

    #[test]
    fn test_malformed_signatures_rejected() {
        let verifier = HmacSha256Verifier::new("secret");
        for sig in ["sha256=not-hex", "sha256=abc", "sha256=0g0g", "sha1=deadbeef", "sha256="] {
            assert_rejected(verifier.verify_signature(b"payload", Some(sig)));
        }
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let body = b"payload";
        let verifier = HmacSha256Verifier::from_secret(None).with_prefix(DEFAULT_SIGNATURE_PREFIX);
        assert!(!verifier.has_secret());

        // Not even a signature made with an empty key gets through
        let header = signature_header_value(b"", body).unwrap();
        assert_rejected(verifier.verify_signature(body, Some(&header)));
    }

    #[test]
    fn test_empty_secret_fails_closed() {
        let body = b"payload";
        let verifier = HmacSha256Verifier::new("");
        assert!(!verifier.has_secret());

        let header = signature_header_value(b"", body).unwrap();
        assert_rejected(verifier.verify_signature(body, Some(&header)));
    }

    #[test]
    fn test_empty_and_binary_payloads() {
        let verifier = HmacSha256Verifier::new("secret");

        let header = signature_header_value(b"secret", b"").unwrap();
        assert!(verifier.verify_signature(b"", Some(&header)).is_ok());

        let binary: &[u8] = &[0x00, 0x01, 0xff, 0xfe, 0x80];
        let header = signature_header_value(b"secret", binary).unwrap();
        assert!(verifier.verify_signature(binary, Some(&header)).is_ok());
    }

    #[test]
    fn test_verifier_as_dyn_trait() {
        let verifier: Arc<dyn WebhookVerifier> = Arc::new(HmacSha256Verifier::new("arc-secret"));
        let header = signature_header_value(b"arc-secret", b"arc-test").unwrap();
        assert!(verifier.verify_signature(b"arc-test", Some(&header)).is_ok());
    }
}
