use std::fmt;
use std::time::Duration;

/// Outcome of one send attempt against one channel.
///
/// Delivery never raises: every result of talking to the remote
/// service is folded into one of these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Message accepted. A `cooldown` means the channel is in slow mode
    /// and the next send must wait that long.
    Sent { cooldown: Option<Duration> },

    /// Message rejected because the channel is rate limited.
    RateLimited { retry_after: Duration },

    /// Message rejected for a reason that retrying will not fix.
    Failed(FailureReason),
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent { .. })
    }
}

/// Reasons why a delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Remote service answered with a status that is neither success
    /// nor "too many requests".
    Status { status: u16, body: String },

    Timeout,

    Network(String),

    /// Channel was still rate limited after the retry budget ran out.
    MaxRetriesExceeded { attempts: u32 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status { status, body } if body.is_empty() =>
                write!(f, "status {}", status),
            FailureReason::Status { status, body } =>
                write!(f, "status {}: {}", status, body),
            FailureReason::Timeout =>
                write!(f, "request timed out"),
            FailureReason::Network(message) =>
                write!(f, "network error: {}", message),
            FailureReason::MaxRetriesExceeded { attempts } =>
                write!(f, "still rate limited after {} retries", attempts),
        }
    }
}

/// Errors produced by a [`Transport`](crate::Transport) before a
/// response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Timeout,
    Network(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout =>
                write!(f, "request timed out"),
            TransportError::Network(message) =>
                write!(f, "network error: {}", message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for FailureReason {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => FailureReason::Timeout,
            TransportError::Network(message) => FailureReason::Network(message),
        }
    }
}

/// Errors raised while building a dispatcher from configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required variable was not set.
    Missing { key: &'static str },

    /// A variable was set but could not be parsed.
    Invalid { key: &'static str, value: String },

    /// The env file could not be read.
    EnvFile { path: String, message: String },

    /// The HTTP client could not be constructed.
    Client(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing { key } =>
                write!(f, "missing required setting {}", key),
            ConfigError::Invalid { key, value } =>
                write!(f, "invalid value for {}: {:?}", key, value),
            ConfigError::EnvFile { path, message } =>
                write!(f, "cannot read env file {}: {}", path, message),
            ConfigError::Client(message) =>
                write!(f, "cannot build HTTP client: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors returned when building a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Messages must contain at least one non-whitespace character.
    EmptyMessage { endpoint_id: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EmptyMessage { endpoint_id } =>
                write!(f, "empty message for channel {}", endpoint_id),
        }
    }
}

impl std::error::Error for RegistryError {}
