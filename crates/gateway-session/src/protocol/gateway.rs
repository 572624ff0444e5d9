//! Protocol abstraction shared by the event and voice gateways
//!
//! Both gateways run the same connection state machine. A [`GatewayProtocol`]
//! supplies everything that differs between them: URL, op code table,
//! authentication payloads, heartbeat shape and close-code policy.

use super::{ClosePolicy, GatewayMessage};
use crate::connection::Session;
use crate::error::ProtocolError;
use std::time::Duration;

/// Control meaning of an inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Server greeting carrying the heartbeat interval
    Hello { interval: Duration },
    /// Session established by an identify
    Ready(ReadyInfo),
    /// Session re-attached by a resume
    Resumed,
    /// Heartbeat acknowledgement, with the echoed nonce if the protocol echoes one
    HeartbeatAck(Option<u64>),
    /// Server asks for an immediate heartbeat
    HeartbeatRequest,
    /// Server asks the client to reconnect and resume
    Reconnect,
    /// Session is no longer valid
    InvalidSession { resumable: bool },
    /// Anything else; handed to the event consumer untouched
    Forward,
}

impl Inbound {
    /// Whether the frame is also delivered to the event consumer
    #[must_use]
    pub const fn is_forwarded(&self) -> bool {
        matches!(self, Self::Ready(_) | Self::Resumed | Self::Forward)
    }
}

/// Identity assigned by the server when a session becomes ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyInfo {
    pub session_id: String,
    /// Endpoint to dial when resuming, if the server supplied one
    pub resume_url: Option<String>,
}

/// Payload schema of one gateway flavour
pub trait GatewayProtocol: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Protocol version sent in the `v` query parameter
    fn version(&self) -> u8;

    /// Shard id, `None` for unsharded protocols
    ///
    /// Keys concurrency-bucket admission when a limiter is configured;
    /// unsharded protocols share bucket 0.
    fn shard_id(&self) -> Option<u32> {
        None
    }

    /// Build the connection URL for an endpoint
    fn url(&self, endpoint: &str) -> String {
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        format!("{endpoint}{separator}v={}&encoding=json", self.version())
    }

    /// Decode the control meaning of an inbound frame
    fn classify(&self, message: &GatewayMessage) -> Result<Inbound, ProtocolError>;

    /// Authenticate a brand-new session
    fn identify(&self) -> Result<GatewayMessage, ProtocolError>;

    /// Re-attach to an existing session
    fn resume(&self, session: &Session) -> Result<GatewayMessage, ProtocolError>;

    /// Liveness ping
    ///
    /// `nonce` is unique per heartbeat; `sequence` is the last sequence seen.
    fn heartbeat(&self, nonce: u64, sequence: Option<u64>) -> GatewayMessage;

    /// Reconnect policy for a close code; `None` means no close frame arrived
    fn close_policy(&self, code: Option<u16>) -> ClosePolicy;
}
