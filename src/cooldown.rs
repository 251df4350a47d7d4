use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::types::EndpointId;

/// Earliest permissible send time per channel.
///
/// Entries are written whenever a channel reports a rate limit or slow
/// mode and are never deleted; an entry in the past means the channel
/// can be sent to immediately. Writes are last-writer-wins.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    async fn get(&self, endpoint_id: &EndpointId) -> Option<Instant>;
    async fn set(&self, endpoint_id: &EndpointId, until: Instant);

    /// Time left before `endpoint_id` may be sent to. Zero when there is
    /// no entry or the entry has passed.
    async fn remaining(&self, endpoint_id: &EndpointId) -> Duration {
        match self.get(endpoint_id).await {
            Some(until) => until.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }
}

/// In-memory cooldowns for a single process.
#[derive(Default)]
pub struct InMemoryCooldowns {
    entries: Mutex<HashMap<EndpointId, Instant>>,
}

impl InMemoryCooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl CooldownStore for InMemoryCooldowns {
    async fn get(&self, endpoint_id: &EndpointId) -> Option<Instant> {
        self.entries.lock().await.get(endpoint_id).copied()
    }

    async fn set(&self, endpoint_id: &EndpointId, until: Instant) {
        self.entries.lock().await.insert(endpoint_id.clone(), until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn remaining_is_zero_without_entry() {
        let store = InMemoryCooldowns::new();
        assert_eq!(store.remaining(&"a".into()).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_counts_down_and_saturates() {
        let store = InMemoryCooldowns::new();
        let id = EndpointId::new("a");
        store.set(&id, Instant::now() + Duration::from_secs(5)).await;

        assert_eq!(store.remaining(&id).await, Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.remaining(&id).await, Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.remaining(&id).await, Duration::ZERO);

        // Stale entries stay in place.
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_write_wins() {
        let store = InMemoryCooldowns::new();
        let id = EndpointId::new("a");
        store.set(&id, Instant::now() + Duration::from_secs(30)).await;
        store.set(&id, Instant::now() + Duration::from_secs(1)).await;

        assert_eq!(store.remaining(&id).await, Duration::from_secs(1));
    }
}
