//! Trait definitions for the collaborators almoner does not own.
//!
//! Session persistence lives behind [`session::SessionStore`] so an
//! application can plug in its own database or cache-backed store.

pub mod session;
