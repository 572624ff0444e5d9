//! Outbound command rate limiting
//!
//! Caps the control messages one connection sends per window. The window is a
//! fixed allowance that refills lazily when a permit is released after the
//! reset time, so an idle limiter does no work.

use super::RateLimitError;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, timeout_at, Instant};

/// Default allowance per window
pub const DEFAULT_COMMANDS_PER_WINDOW: u32 = 120;
/// Default window length
pub const DEFAULT_COMMAND_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct RateWindow {
    remaining: u32,
    reset_at: Instant,
}

/// Per-connection command limiter
///
/// Waiters are served first-come-first-served. A granted permit keeps the
/// limiter locked until it is released, so sends through one limiter never
/// overlap.
#[derive(Debug)]
pub struct CommandRateLimiter {
    window: Mutex<RateWindow>,
    per_window: u32,
    period: Duration,
}

impl CommandRateLimiter {
    /// Limiter granting `per_window` permits every `period`
    ///
    /// A zero allowance is treated as one.
    #[must_use]
    pub fn new(per_window: u32, period: Duration) -> Self {
        let per_window = per_window.max(1);
        Self {
            window: Mutex::new(RateWindow {
                remaining: per_window,
                reset_at: Instant::now(),
            }),
            per_window,
            period,
        }
    }

    /// Wait for a permit, giving up at `deadline`
    ///
    /// If the allowance is spent and the window resets after `deadline`, this
    /// fails right away instead of holding the lock until the deadline.
    pub async fn wait(&self, deadline: Instant) -> Result<CommandPermit<'_>, RateLimitError> {
        let window = timeout_at(deadline, self.window.lock())
            .await
            .map_err(|_| RateLimitError::Timeout)?;

        if window.remaining == 0 && window.reset_at > Instant::now() {
            if window.reset_at > deadline {
                return Err(RateLimitError::Timeout);
            }
            tracing::debug!(
                wait_ms = window.reset_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Command allowance spent, waiting for window reset"
            );
            sleep_until(window.reset_at).await;
        }

        Ok(CommandPermit {
            window: Some(window),
            per_window: self.per_window,
            period: self.period,
        })
    }

    /// Permits left in the current window
    ///
    /// Waits behind any outstanding permit.
    pub async fn remaining(&self) -> u32 {
        let window = self.window.lock().await;
        if window.reset_at <= Instant::now() {
            self.per_window
        } else {
            window.remaining
        }
    }

    #[must_use]
    pub fn per_window(&self) -> u32 {
        self.per_window
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for CommandRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_COMMANDS_PER_WINDOW, DEFAULT_COMMAND_WINDOW)
    }
}

/// Right to send one command
///
/// Releasing (or dropping) the permit spends one unit of the allowance and
/// unlocks the limiter for the next waiter.
#[must_use = "dropping a permit releases it immediately"]
#[derive(Debug)]
pub struct CommandPermit<'a> {
    window: Option<MutexGuard<'a, RateWindow>>,
    per_window: u32,
    period: Duration,
}

impl CommandPermit<'_> {
    /// Release the permit after the protected send
    pub fn release(mut self) {
        self.settle();
    }

    fn settle(&mut self) {
        if let Some(mut window) = self.window.take() {
            let now = Instant::now();
            if window.reset_at <= now {
                window.remaining = self.per_window;
                window.reset_at = now + self.period;
            }
            window.remaining = window.remaining.saturating_sub(1);
        }
    }
}

impl Drop for CommandPermit<'_> {
    fn drop(&mut self) {
        self.settle();
    }
}
