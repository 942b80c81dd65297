//! Session management
//!
//! A cookie carries an opaque random session id; session data lives in a
//! [`SessionStore`](crate::traits::session::SessionStore). The CSRF guard
//! binds its token to this session.

mod cleanup;
mod config;
mod in_memory;
mod layer;

pub use cleanup::spawn_cleanup_task;
pub use config::{SameSitePolicy, SessionConfig};
pub use in_memory::InMemorySessionStore;
pub use layer::{Session, SessionLayer, SessionService, session_id_from_headers};
