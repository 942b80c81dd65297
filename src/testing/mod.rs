//! Testing utilities
//!
//! Requests run through the router with `tower::ServiceExt::oneshot`, so
//! the full middleware stack (session, CSRF, security headers) is exercised
//! without binding a port.
//!
//! ```rust,ignore
//! use almoner::{App, testing};
//!
//! #[tokio::test]
//! async fn test_health() {
//!     testing::get(App::new().into_router(), "/health")
//!         .execute()
//!         .await
//!         .assert_ok();
//! }
//! ```

mod scenario;

pub use scenario::{Scenario, ScenarioAssert, delete, get, patch, post, put};
