use std::sync::Arc;

use tracing::info;

use crate::client::{metric_inc, DeliveryClient, Transport};
use crate::config::DispatcherConfig;
use crate::cooldown::CooldownStore;
use crate::error::DeliveryOutcome;
use crate::registry::Registry;
use crate::report::{DispatchEvent, DispatchReport, ReportSink, TracingSink};
use crate::scheduler::{RetryHandle, RetryScheduler};
use crate::types::{PendingDelivery, PendingSet};

#[cfg(feature = "http")]
use crate::config::ClientConfig;
#[cfg(feature = "http")]
use crate::cooldown::InMemoryCooldowns;
#[cfg(feature = "http")]
use crate::error::ConfigError;
#[cfg(feature = "http")]
use crate::transport::HttpTransport;

/// A finished initial pass, plus the retry loop it started, if any.
#[derive(Debug)]
pub struct DispatchCycle {
    pub report: DispatchReport,

    /// Present when at least one channel was rate limited.
    pub retry: Option<RetryHandle>,
}

/// Sends a registry's messages and hands rate-limited channels to a
/// background [`RetryScheduler`].
///
/// Cycles are independent except for the cooldown store, which every
/// cycle started from the same dispatcher shares.
pub struct Dispatcher {
    client: DeliveryClient,
    config: DispatcherConfig,
    sink: Arc<dyn ReportSink>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        cooldowns: Arc<dyn CooldownStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            client: DeliveryClient::new(transport, cooldowns),
            config,
            sink: Arc::new(TracingSink),
        }
    }

    /// Dispatcher over HTTP with process-local cooldowns.
    #[cfg(feature = "http")]
    pub fn from_client_config(
        client_config: &ClientConfig,
        config: DispatcherConfig,
    ) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(client_config)?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(InMemoryCooldowns::new()),
            config,
        ))
    }

    /// Replace the default tracing sink.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn cooldowns(&self) -> &Arc<dyn CooldownStore> {
        self.client.cooldowns()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Send every registry message once, in registry order.
    ///
    /// Rate-limited channels are retried on a spawned task whose handle
    /// is returned in the cycle; this call does not wait for it.
    /// Failed channels are reported and left alone.
    pub async fn dispatch_all(&self, registry: &Registry) -> DispatchCycle {
        if registry.is_empty() {
            self.sink.report(&DispatchEvent::NothingToSend);
            return DispatchCycle {
                report: DispatchReport::default(),
                retry: None,
            };
        }

        metric_inc("dispatch.cycle.started");
        let (report, pending) = self.initial_pass(registry).await;
        info!(
            sent = report.sent.len(),
            pending = report.pending.len(),
            failed = report.failed.len(),
            "initial pass complete\n{}",
            report
        );

        let retry = if pending.is_empty() {
            None
        } else {
            let scheduler = RetryScheduler::new(
                self.client.clone(),
                self.config.retry.clone(),
                self.sink.clone(),
            );
            Some(scheduler.spawn(pending, report.sent.clone()))
        };

        DispatchCycle { report, retry }
    }

    async fn initial_pass(&self, registry: &Registry) -> (DispatchReport, PendingSet) {
        let mut report = DispatchReport::default();
        let mut pending = PendingSet::new();

        for (endpoint_id, message) in registry.iter() {
            match self.client.attempt_send(endpoint_id, message).await {
                DeliveryOutcome::Sent { .. } => {
                    self.sink.report(&DispatchEvent::EndpointSent {
                        endpoint_id: endpoint_id.clone(),
                    });
                    report.sent.push(endpoint_id.clone());
                }
                DeliveryOutcome::RateLimited { retry_after } => {
                    self.sink.report(&DispatchEvent::EndpointPending {
                        endpoint_id: endpoint_id.clone(),
                        wait: retry_after,
                    });
                    let delivery = PendingDelivery::new(endpoint_id.clone(), message, retry_after);
                    pending.insert(delivery.clone());
                    report.pending.push(delivery);
                }
                DeliveryOutcome::Failed(reason) => {
                    self.sink.report(&DispatchEvent::EndpointFailed {
                        endpoint_id: endpoint_id.clone(),
                        reason: reason.clone(),
                    });
                    report.failed.push((endpoint_id.clone(), reason));
                }
            }
        }

        (report, pending)
    }
}
