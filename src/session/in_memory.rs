use crate::error::Result;
use crate::traits::session::{SessionData, SessionStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory session store
///
/// Sessions are lost on restart and are not shared across instances, so this
/// suits development, tests and single-instance deployments.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionData>> {
        let expired = match self.sessions.read().await.get(session_id) {
            Some(session) if !session.is_expired() => return Ok(Some(session.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.sessions.write().await.remove(session_id);
        }
        Ok(None)
    }

    async fn save(&self, session_id: &str, data: SessionData) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), data);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let initial_len = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        Ok(initial_len - sessions.len())
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_load_save() {
        let store = InMemorySessionStore::new();
        let mut session_data = SessionData::new(Duration::from_secs(3600));
        session_data.set("user_id".to_string(), "123".to_string());

        store.save("test-session-1", session_data).await.unwrap();

        let loaded = store.load("test-session-1").await.unwrap();
        assert_eq!(loaded.unwrap().get("user_id"), Some(&"123".to_string()));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemorySessionStore::new();
        store
            .save("test-session-1", SessionData::new(Duration::from_secs(3600)))
            .await
            .unwrap();
        store.delete("test-session-1").await.unwrap();

        assert!(store.load("test-session-1").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped_on_load() {
        let store = InMemorySessionStore::new();
        store
            .save("test-session-1", SessionData::new(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.load("test-session-1").await.unwrap().is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = InMemorySessionStore::new();
        store
            .save("expired-1", SessionData::new(Duration::from_millis(10)))
            .await
            .unwrap();
        store
            .save("valid-1", SessionData::new(Duration::from_secs(3600)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(store.load("expired-1").await.unwrap().is_none());
        assert!(store.load("valid-1").await.unwrap().is_some());
    }
}
