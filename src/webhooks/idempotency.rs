use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Event ids remembered by a default [`MemoryIdempotencyStore`]
pub const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 10_000;

/// Trait for storing processed webhook event IDs to prevent duplicate processing
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool>;

    /// Claim `event_id` for processing.
    ///
    /// Returns `false` if the id is already claimed, in which case the
    /// caller must not process the event. Check and insert must be atomic.
    async fn try_mark(&self, event_id: String) -> Result<bool>;

    /// Give up a claim after processing failed, so a redelivery is handled
    async fn unmark(&self, event_id: &str) -> Result<()>;
}

#[derive(Default)]
struct RecentIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

/// In-memory idempotency store
///
/// Remembers the most recent `capacity` event ids and forgets the oldest
/// beyond that. Forgets everything on restart; gateways that redeliver across
/// restarts need a persistent store behind the same trait.
#[derive(Clone)]
pub struct MemoryIdempotencyStore {
    recent: Arc<Mutex<RecentIds>>,
    capacity: usize,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_IDEMPOTENCY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            recent: Arc::new(Mutex::new(RecentIds::default())),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.recent.lock().await.ids.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        Ok(self.recent.lock().await.ids.contains(event_id))
    }

    async fn try_mark(&self, event_id: String) -> Result<bool> {
        let mut recent = self.recent.lock().await;
        if recent.ids.contains(&event_id) {
            return Ok(false);
        }

        if recent.order.len() >= self.capacity {
            if let Some(oldest) = recent.order.pop_front() {
                recent.ids.remove(&oldest);
            }
        }
        recent.ids.insert(event_id.clone());
        recent.order.push_back(event_id);
        Ok(true)
    }

    async fn unmark(&self, event_id: &str) -> Result<()> {
        let mut recent = self.recent.lock().await;
        if recent.ids.remove(event_id) {
            recent.order.retain(|id| id != event_id);
        }
        Ok(())
    }
}
