#[cfg(feature = "redis")]
use std::time::Duration;

#[cfg(feature = "redis")]
use async_trait::async_trait;
#[cfg(feature = "redis")]
use redis::AsyncCommands;
#[cfg(feature = "redis")]
use tokio::time::Instant;
#[cfg(feature = "redis")]
use tracing::warn;

#[cfg(feature = "redis")]
use crate::cooldown::CooldownStore;
#[cfg(feature = "redis")]
use crate::types::EndpointId;

/// Cooldowns shared between processes through Redis.
///
/// Each entry is a key whose TTL is the remaining cooldown, so expired
/// entries disappear on their own. Connection errors are logged and
/// read as "no cooldown".
#[cfg(feature = "redis")]
pub struct RedisCooldowns {
    client: redis::Client,
    prefix: String,
}

#[cfg(feature = "redis")]
impl RedisCooldowns {
    pub fn new(client: redis::Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn cooldown_key(&self, endpoint_id: &EndpointId) -> String {
        format!("{}:cooldown:{}", self.prefix, endpoint_id.0)
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl CooldownStore for RedisCooldowns {
    async fn get(&self, endpoint_id: &EndpointId) -> Option<Instant> {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(err) => {
                warn!(error = %err, "redis unavailable, ignoring cooldown");
                return None;
            }
        };
        let ttl_ms: i64 = conn.pttl(self.cooldown_key(endpoint_id)).await.unwrap_or(-2);
        // -2: no key, -1: key without expiry (never written by us).
        if ttl_ms <= 0 {
            return None;
        }
        Some(Instant::now() + Duration::from_millis(ttl_ms as u64))
    }

    async fn set(&self, endpoint_id: &EndpointId, until: Instant) {
        let mut conn = match self.client.get_tokio_connection().await {
            Ok(c) => c,
            Err(err) => {
                warn!(error = %err, "redis unavailable, cooldown not recorded");
                return;
            }
        };
        let key = self.cooldown_key(endpoint_id);
        let remaining = until.saturating_duration_since(Instant::now()).as_millis() as usize;
        let result: redis::RedisResult<()> = if remaining == 0 {
            conn.del(key).await
        } else {
            conn.pset_ex(key, 1u8, remaining).await
        };
        if let Err(err) = result {
            warn!(error = %err, endpoint = %endpoint_id, "failed to record cooldown");
        }
    }
}
