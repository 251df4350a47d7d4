use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique identifier for a delivery channel.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of channel IDs with message text or other string values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EndpointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A message that has not been delivered yet because its channel
/// reported a rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub endpoint_id: EndpointId,

    /// Message text, unchanged since the registry was read.
    pub message: String,

    /// Most recent `retry_after` reported by the channel.
    pub retry_after: Duration,

    /// Retry attempts made by the background scheduler so far.
    /// The initial send is not counted.
    pub attempts: u32,
}

impl PendingDelivery {
    pub fn new(endpoint_id: EndpointId, message: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            endpoint_id,
            message: message.into(),
            retry_after,
            attempts: 0,
        }
    }
}

/// Ordered set of pending deliveries owned by one dispatch cycle.
///
/// Only shrinks: entries are added during the initial pass and removed
/// by the retry scheduler as channels clear.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    entries: Vec<PendingDelivery>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delivery, replacing any entry for the same channel in place.
    pub fn insert(&mut self, delivery: PendingDelivery) {
        match self.position(&delivery.endpoint_id) {
            Some(index) => self.entries[index] = delivery,
            None => self.entries.push(delivery),
        }
    }

    pub fn get(&self, endpoint_id: &EndpointId) -> Option<&PendingDelivery> {
        self.entries.iter().find(|d| &d.endpoint_id == endpoint_id)
    }

    pub(crate) fn get_mut(&mut self, endpoint_id: &EndpointId) -> Option<&mut PendingDelivery> {
        self.entries.iter_mut().find(|d| &d.endpoint_id == endpoint_id)
    }

    pub(crate) fn remove(&mut self, endpoint_id: &EndpointId) -> Option<PendingDelivery> {
        self.position(endpoint_id).map(|index| self.entries.remove(index))
    }

    /// Snapshot of the ids currently pending, in insertion order.
    pub fn ids(&self) -> Vec<EndpointId> {
        self.entries.iter().map(|d| d.endpoint_id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingDelivery> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, endpoint_id: &EndpointId) -> Option<usize> {
        self.entries.iter().position(|d| &d.endpoint_id == endpoint_id)
    }
}
