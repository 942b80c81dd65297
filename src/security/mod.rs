//! Response security headers.
//!
//! HSTS, nosniff, X-Frame-Options, Referrer-Policy and a Content-Security-Policy
//! whose default limits form submissions to the site's own origin.

mod config;
mod headers;

pub use config::{FrameOptions, ReferrerPolicy, SecurityConfig, SecurityConfigBuilder};
pub use headers::{SecurityHeadersLayer, SecurityHeadersService, build_security_headers_layer};
