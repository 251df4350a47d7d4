use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::{metric_inc, DeliveryClient};
use crate::config::RetryPolicy;
use crate::cooldown::CooldownStore;
use crate::error::{DeliveryOutcome, FailureReason};
use crate::report::{join_ids, CycleSummary, DispatchEvent, ReportSink};
use crate::types::{EndpointId, PendingDelivery, PendingSet};

/// Background retry loop for one dispatch cycle.
///
/// Repeatedly scans the pending set, sleeping out each channel's
/// cooldown before re-sending, until every channel is either delivered
/// or given up on.
///
/// Transitions per retry:
/// - `Sent`: removed from pending, appended to the sent list
/// - `RateLimited`: stays pending, whatever the `retry_after`
/// - `Failed`: removed and reported, never retried
/// - retry budget spent while still rate limited: removed as
///   `MaxRetriesExceeded`
pub struct RetryScheduler {
    client: DeliveryClient,
    policy: RetryPolicy,
    sink: Arc<dyn ReportSink>,
}

impl RetryScheduler {
    pub fn new(client: DeliveryClient, policy: RetryPolicy, sink: Arc<dyn ReportSink>) -> Self {
        Self { client, policy, sink }
    }

    /// Run the loop on its own task.
    ///
    /// `sent` is the initial pass's sent list; retry successes are
    /// appended to it.
    pub fn spawn(self, pending: PendingSet, sent: Vec<EndpointId>) -> RetryHandle {
        RetryHandle {
            handle: tokio::spawn(self.run(pending, sent)),
        }
    }

    pub async fn run(self, mut pending: PendingSet, mut sent: Vec<EndpointId>) -> CycleSummary {
        let mut failed = Vec::new();
        info!(pending = pending.len(), "retry scheduler started");

        while !pending.is_empty() {
            for endpoint_id in pending.ids() {
                let Some(delivery) = pending.get(&endpoint_id) else {
                    continue;
                };
                let message = delivery.message.clone();

                let mut wait = self.first_wait(delivery).await;
                while !wait.is_zero() {
                    self.sink.report(&DispatchEvent::EndpointWaiting {
                        endpoint_id: endpoint_id.clone(),
                        wait,
                    });
                    sleep(wait).await;
                    // Another cycle may have pushed the cooldown further out.
                    wait = self.client.cooldowns().remaining(&endpoint_id).await;
                }

                metric_inc("dispatch.retry.attempt");
                match self.client.attempt_send(&endpoint_id, &message).await {
                    DeliveryOutcome::Sent { .. } => {
                        pending.remove(&endpoint_id);
                        info!(endpoint = %endpoint_id, "message finally sent");
                        self.sink.report(&DispatchEvent::EndpointSent {
                            endpoint_id: endpoint_id.clone(),
                        });
                        sent.push(endpoint_id);
                    }
                    DeliveryOutcome::RateLimited { retry_after } => {
                        let Some(entry) = pending.get_mut(&endpoint_id) else {
                            continue;
                        };
                        entry.attempts += 1;
                        entry.retry_after = retry_after;
                        let attempts = entry.attempts;

                        if self.policy.exhausted(attempts) {
                            pending.remove(&endpoint_id);
                            warn!(endpoint = %endpoint_id, attempts, "giving up on rate-limited channel");
                            self.give_up(
                                &mut failed,
                                endpoint_id,
                                FailureReason::MaxRetriesExceeded { attempts },
                            );
                        } else {
                            debug!(endpoint = %endpoint_id, attempts, "still rate limited");
                            self.sink.report(&DispatchEvent::EndpointPending {
                                endpoint_id: endpoint_id.clone(),
                                wait: retry_after,
                            });
                        }
                    }
                    DeliveryOutcome::Failed(reason) => {
                        pending.remove(&endpoint_id);
                        self.give_up(&mut failed, endpoint_id, reason);
                    }
                }
            }
        }

        metric_inc("dispatch.cycle.drained");
        info!(sent = %join_ids(&sent), failed = failed.len(), "all pending channels resolved");
        self.sink.report(&DispatchEvent::CycleDrained { sent: sent.clone() });

        CycleSummary { sent, failed }
    }

    /// Cooldown left for the channel, or the backoff floor when a
    /// retried channel reported no usable `retry_after`.
    async fn first_wait(&self, delivery: &PendingDelivery) -> Duration {
        let cooldown = self.client.cooldowns().remaining(&delivery.endpoint_id).await;
        if cooldown.is_zero() && delivery.attempts > 0 && delivery.retry_after.is_zero() {
            return self.policy.backoff_for_attempt(delivery.attempts) + self.policy.jitter();
        }
        cooldown
    }

    fn give_up(
        &self,
        failed: &mut Vec<(EndpointId, FailureReason)>,
        endpoint_id: EndpointId,
        reason: FailureReason,
    ) {
        self.sink.report(&DispatchEvent::EndpointFailed {
            endpoint_id: endpoint_id.clone(),
            reason: reason.clone(),
        });
        failed.push((endpoint_id, reason));
    }
}

/// Handle to a running retry loop.
///
/// Await it with [`RetryHandle::wait`], stop it with
/// [`RetryHandle::abort`], or drop it to let the loop run detached.
#[derive(Debug)]
pub struct RetryHandle {
    handle: JoinHandle<CycleSummary>,
}

impl RetryHandle {
    /// Wait for the pending set to drain. Returns `None` if the loop was
    /// aborted or panicked.
    pub async fn wait(self) -> Option<CycleSummary> {
        self.handle.await.ok()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
