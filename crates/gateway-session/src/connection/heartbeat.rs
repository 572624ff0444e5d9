//! Heartbeat liveness tracking
//!
//! Runs as a concurrent task alongside the read loop. At most one heartbeat
//! nonce is outstanding; a tick that finds the previous nonce still pending,
//! or an acknowledgement that echoes the wrong nonce, is a liveness failure.

use crate::error::GatewayError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Liveness failures detected by the heartbeat protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeartbeatError {
    /// The previous heartbeat was not acknowledged within one interval
    #[error("Heartbeat {nonce} was never acknowledged")]
    MissedAck { nonce: u64 },

    /// An acknowledgement echoed a nonce other than the pending one
    #[error("Heartbeat nonce mismatch: expected {expected:?}, got {received:?}")]
    NonceMismatch {
        expected: Option<u64>,
        received: Option<u64>,
    },
}

/// Heartbeat bookkeeping for one socket
#[derive(Debug, Clone, Default)]
pub struct HeartbeatState {
    pub interval: Duration,
    pub last_sent: Option<Instant>,
    pub last_ack: Option<Instant>,
    pub pending_nonce: Option<u64>,
    latency: Option<Duration>,
    last_nonce: u64,
}

impl HeartbeatState {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Start a heartbeat cycle and return its nonce
    ///
    /// Fails if the previous nonce is still outstanding.
    pub fn begin(&mut self, now: Instant) -> Result<u64, HeartbeatError> {
        if let Some(nonce) = self.pending_nonce {
            return Err(HeartbeatError::MissedAck { nonce });
        }
        Ok(self.issue(now))
    }

    /// Nonce for a heartbeat the server asked for
    ///
    /// Reuses the outstanding nonce so the one-pending rule still holds.
    pub fn request(&mut self, now: Instant) -> u64 {
        match self.pending_nonce {
            Some(nonce) => nonce,
            None => self.issue(now),
        }
    }

    /// Validate an acknowledgement
    ///
    /// `echo` is the nonce returned by the server, or `None` for protocols
    /// whose acknowledgement carries no payload. Such a bare ack settles the
    /// pending heartbeat and is ignored when nothing is pending.
    pub fn acknowledge(&mut self, echo: Option<u64>, now: Instant) -> Result<(), HeartbeatError> {
        match (self.pending_nonce, echo) {
            (Some(pending), Some(echoed)) if pending != echoed => Err(HeartbeatError::NonceMismatch {
                expected: Some(pending),
                received: Some(echoed),
            }),
            (Some(_), _) => {
                self.pending_nonce = None;
                self.last_ack = Some(now);
                self.latency = self.last_sent.map(|sent| now.saturating_duration_since(sent));
                Ok(())
            }
            (None, Some(echoed)) => Err(HeartbeatError::NonceMismatch {
                expected: None,
                received: Some(echoed),
            }),
            (None, None) => {
                trace!("Ignoring acknowledgement with no heartbeat pending");
                Ok(())
            }
        }
    }

    /// Round trip of the last acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    fn issue(&mut self, now: Instant) -> u64 {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let nonce = millis.max(self.last_nonce + 1);
        self.last_nonce = nonce;
        self.pending_nonce = Some(nonce);
        self.last_sent = Some(now);
        nonce
    }
}

/// Where the heartbeat task writes its pings
pub(crate) trait HeartbeatSink: Send + Sync + 'static {
    /// Write one heartbeat frame, failing after `timeout`
    fn send_heartbeat(
        &self,
        nonce: u64,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Periodic heartbeat loop for one socket
///
/// Stops when `cancel` fires. A liveness failure or a failed write is
/// reported once through `fault` and ends the task; a write refused with
/// `NotConnected` ends it silently since the socket is already gone.
pub(crate) async fn run_heartbeat<S: HeartbeatSink>(
    sink: Arc<S>,
    state: Arc<parking_lot::Mutex<HeartbeatState>>,
    interval: Duration,
    cancel: CancellationToken,
    fault: mpsc::Sender<HeartbeatFault>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(interval_ms = interval.as_millis() as u64, "Heartbeat task started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Heartbeat task shutting down");
                return;
            }
            _ = ticker.tick() => {}
        }

        let begun = state.lock().begin(Instant::now());
        let nonce = match begun {
            Ok(nonce) => nonce,
            Err(err) => {
                warn!(error = %err, "Heartbeat ACK missed, connection is a zombie");
                let _ = fault.try_send(HeartbeatFault::Liveness(err));
                return;
            }
        };

        trace!(nonce, "Sending heartbeat");
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            sent = sink.send_heartbeat(nonce, interval) => sent,
        };

        match sent {
            Ok(()) => {}
            Err(GatewayError::NotConnected) => {
                debug!("Socket gone, heartbeat task stopping");
                return;
            }
            Err(err) => {
                warn!(error = %err, "Heartbeat send failed");
                let _ = fault.try_send(HeartbeatFault::Send);
                return;
            }
        }
    }
}

/// Why the heartbeat task gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatFault {
    Liveness(HeartbeatError),
    Send,
}

impl std::fmt::Display for HeartbeatFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Liveness(err) => write!(f, "{err}"),
            Self::Send => f.write_str("Heartbeat could not be written"),
        }
    }
}
