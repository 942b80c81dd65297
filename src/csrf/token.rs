//! Session-bound authenticity tokens.
//!
//! Every session holds one random secret (the session token). Forms never
//! embed it directly; each render gets a masked copy
//! `base64url(pad || (pad XOR secret))` with a fresh one-time pad, so the
//! value in the page changes on every render and cannot be used to recover
//! the secret through compression side channels. Verification unmasks and
//! compares in constant time. The raw session token is accepted as well.

use crate::session::Session;
use crate::utils::{random_bytes, random_token};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use subtle::ConstantTimeEq;

/// Session key holding the per-session CSRF secret
pub const SESSION_TOKEN_KEY: &str = "_csrf_token";

/// Random bytes in a generated session token
pub const TOKEN_BYTES: usize = 32;

/// Generate a new session token
pub fn generate_session_token() -> String {
    random_token(TOKEN_BYTES)
}

/// The session's token, creating and storing one if the session has none
pub async fn session_token(session: &Session) -> String {
    session
        .get_or_insert_with(SESSION_TOKEN_KEY, || {
            tracing::debug!("Issued new session CSRF token");
            generate_session_token()
        })
        .await
}

/// Replace the session's token. Every previously rendered form stops
/// verifying.
pub async fn rotate_session_token(session: &Session) -> String {
    let token = generate_session_token();
    session.insert(SESSION_TOKEN_KEY, token.clone()).await;
    token
}

/// Produce a per-render masked copy of `session_token`
pub fn mask_token(session_token: &str) -> String {
    let raw = session_token.as_bytes();
    let pad = random_bytes(raw.len());

    let mut masked = Vec::with_capacity(raw.len() * 2);
    masked.extend_from_slice(&pad);
    masked.extend(pad.iter().zip(raw).map(|(p, r)| p ^ r));

    URL_SAFE_NO_PAD.encode(masked)
}

fn unmask(masked: &[u8]) -> Vec<u8> {
    let (pad, encrypted) = masked.split_at(masked.len() / 2);
    pad.iter().zip(encrypted).map(|(p, e)| p ^ e).collect()
}

/// Check a submitted token against the session's token.
///
/// Accepts the raw session token or any masked copy of it. Empty,
/// undecodable or wrong-length submissions are rejected.
pub fn verify_token(session_token: &str, submitted: &str) -> bool {
    if session_token.is_empty() || submitted.is_empty() {
        return false;
    }

    let expected = session_token.as_bytes();

    if submitted.len() == expected.len() {
        return constant_time_compare(expected, submitted.as_bytes());
    }

    let Ok(decoded) = URL_SAFE_NO_PAD.decode(submitted) else {
        return false;
    };
    if decoded.len() != expected.len() * 2 {
        return false;
    }

    constant_time_compare(expected, &unmask(&decoded))
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
