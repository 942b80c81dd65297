//! Session storage trait
//!
//! Session persistence is owned by the application. This trait is the seam
//! the session middleware talks to; [`crate::session::InMemorySessionStore`]
//! is the reference implementation.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Session data stored in the session store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Session data as key-value pairs
    pub data: HashMap<String, String>,

    /// When the session was created
    pub created_at: SystemTime,

    /// When the session expires
    pub expires_at: SystemTime,
}

impl SessionData {
    /// Create a new session with expiration
    pub fn new(ttl: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            data: HashMap::new(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.data.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.data.remove(key)
    }

    /// Push the expiry `ttl` into the future from now
    pub fn extend(&mut self, ttl: Duration) {
        self.expires_at = SystemTime::now() + ttl;
    }
}

/// Session storage trait
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load session data by session ID
    ///
    /// Returns `Ok(None)` if the session doesn't exist or has expired.
    async fn load(&self, session_id: &str) -> Result<Option<SessionData>>;

    /// Save session data under a session ID
    async fn save(&self, session_id: &str, data: SessionData) -> Result<()>;

    /// Delete a session
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Remove expired sessions, returning how many were dropped
    async fn cleanup_expired(&self) -> Result<usize>;

    fn is_healthy(&self) -> bool;
}
