use crate::protocol::GatewayMessage;

/// What a connection delivers to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A non-control frame, in arrival order
    Message(GatewayMessage),
    /// The connection stopped for good
    ///
    /// Sent exactly once per terminal stop: a terminal close code, a failure
    /// with auto-reconnect disabled, or an abandoned reconnect. Not sent for
    /// user-initiated closes.
    Closed(CloseNotice),
}

/// Why a connection stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseNotice {
    /// Close code, if the socket closed with one
    pub code: Option<u16>,
    pub reason: String,
}

impl std::fmt::Display for CloseNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "closed with code {code}: {}", self.reason),
            None => write!(f, "closed: {}", self.reason),
        }
    }
}
