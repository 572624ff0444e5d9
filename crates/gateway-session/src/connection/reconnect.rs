//! Reconnection scheduling with bounded linear backoff

use crate::error::GatewayError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Linear backoff: `delay = min(attempt * step, max_delay)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Added to the delay on every failed attempt
    pub step: Duration,
    /// Ceiling for the delay
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub const fn new(step: Duration, max_delay: Duration) -> Self {
        Self { step, max_delay }
    }

    /// Delay before the given attempt (attempt 0 is immediate)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Retries an open operation until it succeeds or is cancelled
///
/// There is no attempt cap; cancel the token to give up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconnectCoordinator {
    policy: ReconnectPolicy,
}

impl ReconnectCoordinator {
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Call `open(attempt)` after each backoff delay until it succeeds
    ///
    /// Returns `Cancelled` as soon as `cancel` fires, without starting another
    /// attempt. `AlreadyConnected` is a usage error and is returned unretried.
    pub async fn run<F, Fut>(&self, cancel: &CancellationToken, mut open: F) -> Result<(), GatewayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), GatewayError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let delay = self.policy.delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                () = sleep(delay) => {}
            }

            match open(attempt).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_usage_error() => return Err(err),
                Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
                Err(err) => {
                    warn!(attempt, error = %err, "Reconnect attempt failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
