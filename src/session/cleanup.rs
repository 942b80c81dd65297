//! Periodic removal of expired sessions.
//!
//! Expired sessions are only dropped by `load` when their id comes back, so
//! sessions started by one-off visitors would otherwise stay in the store
//! forever. [`App::serve`](crate::App::serve) runs this sweep for the
//! lifetime of the server.

use crate::traits::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn a task calling [`SessionStore::cleanup_expired`] every `every`.
///
/// The first sweep runs immediately. The task runs until the returned handle
/// is aborted; a failed sweep is logged and retried on the next tick.
pub fn spawn_cleanup_task(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match store.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Removed expired sessions"),
                Err(err) => tracing::warn!(error = %err, "Session cleanup failed"),
            }
        }
    })
}
