//! Per-connection configuration

use super::ReconnectPolicy;
use crate::ratelimit::{ConcurrencyBucketLimiter, DEFAULT_COMMANDS_PER_WINDOW, DEFAULT_COMMAND_WINDOW};
use gateway_common::ClientConfig;
use std::sync::Arc;
use std::time::Duration;

/// Settings for one gateway connection
///
/// Passed explicitly to the constructor; nothing falls back to process-wide
/// defaults.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint without query string, e.g. `wss://gateway.discord.gg`
    pub endpoint: String,
    /// Deadline for the WebSocket handshake
    pub dial_timeout: Duration,
    /// Reconnect after sanctioned failures
    pub auto_reconnect: bool,
    /// Deadline for waiting on the identify bucket and writing the auth frame
    pub authenticate_timeout: Duration,
    /// Capacity of the event channel
    pub event_buffer: usize,
    /// Outbound command allowance per window
    pub commands_per_window: u32,
    pub command_window: Duration,
    pub reconnect: ReconnectPolicy,
    /// Identify concurrency limiter shared across shards
    ///
    /// `None` skips bucket admission entirely.
    pub bucket_limiter: Option<Arc<ConcurrencyBucketLimiter>>,
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            dial_timeout: Duration::from_secs(10),
            auto_reconnect: true,
            authenticate_timeout: Duration::from_secs(60),
            event_buffer: 256,
            commands_per_window: DEFAULT_COMMANDS_PER_WINDOW,
            command_window: DEFAULT_COMMAND_WINDOW,
            reconnect: ReconnectPolicy::default(),
            bucket_limiter: None,
        }
    }

    /// Event connection settings from the loaded client configuration
    ///
    /// The bucket limiter is left unset; shards share one supplied by the caller.
    #[must_use]
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            dial_timeout: Duration::from_millis(config.reconnect.dial_timeout_ms),
            auto_reconnect: config.reconnect.auto_reconnect,
            commands_per_window: config.limits.commands_per_minute,
            command_window: Duration::from_secs(60),
            reconnect: ReconnectPolicy::new(
                Duration::from_millis(config.reconnect.step_ms),
                Duration::from_millis(config.reconnect.max_delay_ms),
            ),
            ..Self::new(config.gateway.url.clone())
        }
    }

    #[must_use]
    pub fn with_bucket_limiter(mut self, limiter: Arc<ConcurrencyBucketLimiter>) -> Self {
        self.bucket_limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn with_command_limit(mut self, per_window: u32, window: Duration) -> Self {
        self.commands_per_window = per_window;
        self.command_window = window;
        self
    }

    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }
}
