use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::FailureReason;
use crate::types::{EndpointId, PendingDelivery};

/// Progress events emitted by a dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// The registry was empty; nothing was sent.
    NothingToSend,

    EndpointSent { endpoint_id: EndpointId },

    /// Channel is rate limited and was handed to the retry scheduler.
    EndpointPending { endpoint_id: EndpointId, wait: Duration },

    /// Retry scheduler is sleeping out a channel's cooldown.
    EndpointWaiting { endpoint_id: EndpointId, wait: Duration },

    EndpointFailed { endpoint_id: EndpointId, reason: FailureReason },

    /// Every pending channel has been resolved. Carries the cumulative
    /// list of channels the cycle delivered to.
    CycleDrained { sent: Vec<EndpointId> },
}

/// Receives dispatch events. Implementations must not block.
pub trait ReportSink: Send + Sync {
    fn report(&self, event: &DispatchEvent);
}

impl<S: ReportSink + ?Sized> ReportSink for Arc<S> {
    fn report(&self, event: &DispatchEvent) {
        (**self).report(event)
    }
}

/// Writes every event to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::NothingToSend =>
                warn!("no saved channels"),
            DispatchEvent::EndpointSent { endpoint_id } =>
                info!(endpoint = %endpoint_id, "message sent"),
            DispatchEvent::EndpointPending { endpoint_id, wait } =>
                info!(endpoint = %endpoint_id, wait_secs = wait.as_secs_f64(), "channel under slow mode"),
            DispatchEvent::EndpointWaiting { endpoint_id, wait } =>
                info!(endpoint = %endpoint_id, wait_secs = wait.as_secs_f64(), "waiting before retry"),
            DispatchEvent::EndpointFailed { endpoint_id, reason } =>
                error!(endpoint = %endpoint_id, reason = %reason, "delivery failed"),
            DispatchEvent::CycleDrained { sent } =>
                info!(sent = %join_ids(sent), "all pending messages resolved"),
        }
    }
}

/// Forwards events to an unbounded channel, for UIs that render
/// progress on their own task. Events are dropped once the receiver
/// is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DispatchEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReportSink for ChannelSink {
    fn report(&self, event: &DispatchEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Result of the initial send pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: Vec<EndpointId>,
    pub pending: Vec<PendingDelivery>,
    pub failed: Vec<(EndpointId, FailureReason)>,
}

impl DispatchReport {
    /// True when the registry had no channels.
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.pending.is_empty() && self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.sent.len() + self.pending.len() + self.failed.len()
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No saved channels.");
        }

        write!(f, "Messages sent to channels: {}", join_ids(&self.sent))?;

        if !self.pending.is_empty() {
            write!(f, "\nChannels under slow mode:")?;
            for pending in &self.pending {
                write!(
                    f,
                    "\n - {}: {} seconds",
                    pending.endpoint_id,
                    format_secs(pending.retry_after),
                )?;
            }
        }

        if !self.failed.is_empty() {
            write!(f, "\nFailed channels:")?;
            for (id, reason) in &self.failed {
                write!(f, "\n - {}: {}", id, reason)?;
            }
        }
        Ok(())
    }
}

/// Final state of a drained retry cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Initial-pass successes followed by retry successes, in order.
    pub sent: Vec<EndpointId>,

    /// Channels the scheduler gave up on.
    pub failed: Vec<(EndpointId, FailureReason)>,
}

impl fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All messages successfully sent to channels: {}", join_ids(&self.sent))?;
        for (id, reason) in &self.failed {
            write!(f, "\nGave up on channel {}: {}", id, reason)?;
        }
        Ok(())
    }
}

pub(crate) fn join_ids(ids: &[EndpointId]) -> String {
    ids.iter().map(EndpointId::as_str).collect::<Vec<_>>().join(", ")
}

fn format_secs(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{:.2}", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_says_nothing_to_send() {
        assert_eq!(DispatchReport::default().to_string(), "No saved channels.");
    }

    #[test]
    fn report_lists_all_three_groups() {
        let report = DispatchReport {
            sent: vec!["1".into(), "2".into()],
            pending: vec![PendingDelivery::new("3".into(), "yo", Duration::from_secs(5))],
            failed: vec![("4".into(), FailureReason::Status { status: 403, body: "nope".into() })],
        };

        let rendered = report.to_string();
        assert_eq!(
            rendered,
            "Messages sent to channels: 1, 2\n\
             Channels under slow mode:\n - 3: 5 seconds\n\
             Failed channels:\n - 4: status 403: nope"
        );
        assert_eq!(report.attempted(), 4);
    }

    #[test]
    fn fractional_wait_is_rounded_for_display() {
        let report = DispatchReport {
            pending: vec![PendingDelivery::new("9".into(), "m", Duration::from_millis(1_250))],
            ..DispatchReport::default()
        };
        assert!(report.to_string().contains(" - 9: 1.25 seconds"));
    }

    #[test]
    fn cycle_summary_lists_sent_then_given_up() {
        let summary = CycleSummary {
            sent: vec!["1".into(), "3".into()],
            failed: vec![("2".into(), FailureReason::MaxRetriesExceeded { attempts: 20 })],
        };

        assert_eq!(
            summary.to_string(),
            "All messages successfully sent to channels: 1, 3\n\
             Gave up on channel 2: still rate limited after 20 retries"
        );
        assert_eq!(
            CycleSummary { sent: vec!["1".into()], failed: Vec::new() }.to_string(),
            "All messages successfully sent to channels: 1"
        );
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.report(&DispatchEvent::NothingToSend);
        assert_eq!(rx.recv().await, Some(DispatchEvent::NothingToSend));

        drop(rx);
        // Receiver gone: reporting must not panic.
        sink.report(&DispatchEvent::NothingToSend);
    }
}
