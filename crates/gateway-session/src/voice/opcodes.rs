//! Voice gateway operation codes (v4)

/// Voice gateway operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VoiceOpCode {
    /// Begin a voice session (send only)
    Identify = 0,
    /// Select the media transport protocol (send only)
    SelectProtocol = 1,
    /// Media endpoint and SSRC for the session (receive only)
    Ready = 2,
    /// Keep the session alive; `d` is the nonce (send only)
    Heartbeat = 3,
    /// Encryption mode and secret key (receive only)
    SessionDescription = 4,
    /// Speaking state of a user
    Speaking = 5,
    /// Heartbeat acknowledged; `d` echoes the nonce (receive only)
    HeartbeatAck = 6,
    /// Resume a dropped voice session (send only)
    Resume = 7,
    /// Heartbeat interval, sent on connect (receive only)
    Hello = 8,
    /// Resume accepted (receive only)
    Resumed = 9,
    /// A user left the voice channel (receive only)
    ClientDisconnect = 13,
}

impl VoiceOpCode {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Identify),
            1 => Some(Self::SelectProtocol),
            2 => Some(Self::Ready),
            3 => Some(Self::Heartbeat),
            4 => Some(Self::SessionDescription),
            5 => Some(Self::Speaking),
            6 => Some(Self::HeartbeatAck),
            7 => Some(Self::Resume),
            8 => Some(Self::Hello),
            9 => Some(Self::Resumed),
            13 => Some(Self::ClientDisconnect),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Identify => "Identify",
            Self::SelectProtocol => "SelectProtocol",
            Self::Ready => "Ready",
            Self::Heartbeat => "Heartbeat",
            Self::SessionDescription => "SessionDescription",
            Self::Speaking => "Speaking",
            Self::HeartbeatAck => "HeartbeatAck",
            Self::Resume => "Resume",
            Self::Hello => "Hello",
            Self::Resumed => "Resumed",
            Self::ClientDisconnect => "ClientDisconnect",
        }
    }
}

impl From<VoiceOpCode> for u16 {
    fn from(op: VoiceOpCode) -> Self {
        u16::from(op.as_u8())
    }
}

impl From<VoiceOpCode> for u8 {
    fn from(op: VoiceOpCode) -> Self {
        op.as_u8()
    }
}

impl std::fmt::Display for VoiceOpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}
