use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";

const TOKEN_VAR: &str = "DISCORD_TOKEN";
const API_BASE_VAR: &str = "DISPATCH_API_BASE";
const TIMEOUT_VAR: &str = "DISPATCH_TIMEOUT_SECS";
const MAX_ATTEMPTS_VAR: &str = "DISPATCH_MAX_ATTEMPTS";

/// How the background scheduler retries rate-limited channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries per channel before it is given up on. `None` retries
    /// until the channel clears.
    pub max_attempts: Option<u32>,

    /// Wait floor applied when a channel is still rate limited but
    /// reported no usable `retry_after`. Doubles per retry up to
    /// `backoff_max_ms`.
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(20),
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Backoff floor before retry number `attempt` (1-based), without jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.backoff_base_ms.max(1);
        let max = self.backoff_max_ms.max(base);
        let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(base.saturating_mul(pow).min(max))
    }

    pub fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(0..=self.jitter_ms))
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub retry: RetryPolicy,
}

impl DispatcherConfig {
    /// Read overrides from `DISPATCH_*` variables.
    ///
    /// `DISPATCH_MAX_ATTEMPTS=0` disables the retry limit.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(max) = parse_var::<u32>(MAX_ATTEMPTS_VAR)? {
            config.retry.max_attempts = if max == 0 { None } else { Some(max) };
        }
        Ok(config)
    }
}

/// Settings for talking to the remote messaging API.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub token: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            timeout: Duration::from_secs(10),
            user_agent: concat!("channel-dispatcher/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load from the process environment.
    ///
    /// `DISCORD_TOKEN` is required; `DISPATCH_API_BASE` and
    /// `DISPATCH_TIMEOUT_SECS` are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env::var(TOKEN_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing { key: TOKEN_VAR })?;

        let mut config = Self::new(token);
        if let Ok(api_base) = env::var(API_BASE_VAR) {
            config.api_base = api_base.trim_end_matches('/').to_string();
        }
        if let Some(secs) = parse_var::<u64>(TIMEOUT_VAR)? {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}
