//! Fan-out message delivery to rate-limited channels.
//!
//! This crate sends one message to each channel in a [`Registry`] and
//! retries, on a background task, every channel that answered with a
//! rate limit. Channels are **independently throttled**: a cooldown on
//! one never delays delivery to the others.
//!
//! ## Guarantees
//! - One send attempt per channel in the initial pass, in registry order
//! - A channel is never retried before its recorded cooldown has passed
//! - A channel that was delivered to is never sent to again in the cycle
//! - Bounded retries per channel (configurable)
//!
//! ## Non-Guarantees
//! - Automatic retry of failed (non rate-limit) deliveries
//! - Delivery across process restarts
//! - Ordering between channels during retries
//!
//! Rate-limit state lives in a [`CooldownStore`] shared by every cycle
//! started from the same [`Dispatcher`].

mod client;
mod config;
mod cooldown;
mod dispatcher;
mod error;
mod registry;
mod report;
mod scheduler;
mod types;

#[cfg(feature = "http")]
mod transport;

#[cfg(feature = "redis")]
mod cooldown_redis;

pub use client::{classify, DeliveryClient, Transport, TransportResponse};
pub use config::{ClientConfig, DispatcherConfig, RetryPolicy, DEFAULT_API_BASE};
pub use cooldown::{CooldownStore, InMemoryCooldowns};
pub use dispatcher::{DispatchCycle, Dispatcher};
pub use error::{
    ConfigError,
    DeliveryOutcome,
    FailureReason,
    RegistryError,
    TransportError,
};
pub use registry::{from_env_vars, load_from_env_file, Registry, CHANNEL_PREFIX};
pub use report::{ChannelSink, CycleSummary, DispatchEvent, DispatchReport, ReportSink, TracingSink};
pub use scheduler::{RetryHandle, RetryScheduler};
pub use types::{EndpointId, PendingDelivery, PendingSet};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

#[cfg(feature = "redis")]
pub use cooldown_redis::RedisCooldowns;
