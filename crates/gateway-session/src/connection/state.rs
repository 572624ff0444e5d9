use serde::{Deserialize, Serialize};

/// Connection state
///
/// Driven only by the read loop and by explicit close calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No socket has been opened yet
    #[default]
    Unconnected,
    /// Dialing the endpoint
    Connecting,
    /// Socket open, waiting for Hello
    WaitingForHandshake,
    /// Identify is being sent
    Authenticating,
    /// Resume is being sent
    Resuming,
    /// Identify or Resume sent, waiting for the server to confirm
    WaitingForReady,
    /// Session established
    Ready,
    /// Socket closed
    Disconnected,
}

impl ConnectionState {
    /// Whether a socket is expected to be held in this state
    #[must_use]
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Unconnected | Self::Disconnected)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unconnected => "Unconnected",
            Self::Connecting => "Connecting",
            Self::WaitingForHandshake => "WaitingForHandshake",
            Self::Authenticating => "Authenticating",
            Self::Resuming => "Resuming",
            Self::WaitingForReady => "WaitingForReady",
            Self::Ready => "Ready",
            Self::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
