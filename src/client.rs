use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cooldown::CooldownStore;
use crate::error::{DeliveryOutcome, FailureReason, TransportError};
use crate::types::EndpointId;

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc(_name: &'static str) {}

#[cfg(feature = "metrics")]
fn metric_inc_endpoint(name: &'static str, endpoint_id: &EndpointId) {
    metrics::increment_counter!(name, "endpoint" => endpoint_id.0.clone());
}

#[cfg(not(feature = "metrics"))]
fn metric_inc_endpoint(_name: &'static str, _endpoint_id: &EndpointId) {}

const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Upper bound on any cooldown read from a response body.
const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Raw response from the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Performs the network call for one message. Implementations must not
/// retry; that is the scheduler's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_message(
        &self,
        endpoint_id: &EndpointId,
        content: &str,
    ) -> Result<TransportResponse, TransportError>;
}

/// Sends one message to one channel and classifies the result.
///
/// Rate-limit and slow-mode signals are written to the shared
/// [`CooldownStore`] before the outcome is returned, so the scheduler
/// always sees the freshest cooldown.
#[derive(Clone)]
pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    cooldowns: Arc<dyn CooldownStore>,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn Transport>, cooldowns: Arc<dyn CooldownStore>) -> Self {
        Self { transport, cooldowns }
    }

    pub fn cooldowns(&self) -> &Arc<dyn CooldownStore> {
        &self.cooldowns
    }

    pub async fn attempt_send(&self, endpoint_id: &EndpointId, message: &str) -> DeliveryOutcome {
        debug!(endpoint = %endpoint_id, len = message.len(), "sending message");

        let outcome = match self.transport.post_message(endpoint_id, message).await {
            Ok(response) => classify(&response),
            Err(err) => DeliveryOutcome::Failed(err.into()),
        };

        match &outcome {
            DeliveryOutcome::RateLimited { retry_after } => {
                self.cooldowns.set(endpoint_id, Instant::now() + *retry_after).await;
                metric_inc("dispatch.delivery.rate_limited");
                metric_inc_endpoint("dispatch.delivery.rate_limited.endpoint", endpoint_id);
                warn!(
                    endpoint = %endpoint_id,
                    retry_after_secs = retry_after.as_secs_f64(),
                    "rate limited"
                );
            }
            DeliveryOutcome::Sent { cooldown } => {
                if let Some(cooldown) = cooldown {
                    self.cooldowns.set(endpoint_id, Instant::now() + *cooldown).await;
                    info!(
                        endpoint = %endpoint_id,
                        slowmode_secs = cooldown.as_secs_f64(),
                        "slow mode active"
                    );
                }
                metric_inc("dispatch.delivery.sent");
                debug!(endpoint = %endpoint_id, "message accepted");
            }
            DeliveryOutcome::Failed(reason) => {
                metric_inc("dispatch.delivery.failed");
                metric_inc_endpoint("dispatch.delivery.failed.endpoint", endpoint_id);
                error!(endpoint = %endpoint_id, reason = %reason, "failed to send message");
            }
        }

        outcome
    }
}

/// Map a raw response to a delivery outcome.
///
/// - 429: rate limited for the body's `retry_after` seconds (0 if absent)
/// - 2xx: sent, with the body's `slowmode_delay` as cooldown when positive
/// - anything else: failed, carrying status and body
pub fn classify(response: &TransportResponse) -> DeliveryOutcome {
    match response.status {
        STATUS_TOO_MANY_REQUESTS => DeliveryOutcome::RateLimited {
            retry_after: seconds_field(&response.body, "retry_after"),
        },
        200..=299 => {
            let slowmode = seconds_field(&response.body, "slowmode_delay");
            DeliveryOutcome::Sent {
                cooldown: (!slowmode.is_zero()).then_some(slowmode),
            }
        }
        status => DeliveryOutcome::Failed(FailureReason::Status {
            status,
            body: response.body.clone(),
        }),
    }
}

/// Read a non-negative number of seconds from a JSON body field.
fn seconds_field(body: &str, field: &str) -> Duration {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get(field).and_then(serde_json::Value::as_f64))
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(MAX_COOLDOWN).min(MAX_COOLDOWN))
        .unwrap_or(Duration::ZERO)
}
