//! Cross-site request forgery protection.
//!
//! Each session carries a random secret. Pages that render forms extract a
//! [`CsrfToken`], a per-render masked copy of that secret, and embed it as
//! the `authenticity_token` field or expose it to scripts through a meta tag
//! or the `X-CSRF-Token` response header. [`CsrfLayer`] rejects POST, PUT,
//! PATCH and DELETE requests whose token is missing, malformed or bound to
//! another session with `403 Forbidden` before any handler runs.

mod config;
mod extractor;
mod layer;
mod token;

pub use config::{CsrfConfig, CsrfConfigBuilder};
pub use extractor::CsrfToken;
pub use layer::{CsrfLayer, CsrfService, build_csrf_layer, is_safe_method};
pub use token::{
    SESSION_TOKEN_KEY, TOKEN_BYTES, generate_session_token, mask_token, rotate_session_token,
    session_token, verify_token,
};
