//! Voice gateway close codes

use crate::protocol::{is_graceful, ClosePolicy};

/// Voice gateway close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VoiceCloseCode {
    UnknownOpcode = 4001,
    DecodeError = 4002,
    NotAuthenticated = 4003,
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    /// The session was dropped on the server side
    SessionNoLongerValid = 4006,
    SessionTimeout = 4009,
    ServerNotFound = 4011,
    UnknownProtocol = 4012,
    /// Kicked, or the channel was deleted
    Disconnected = 4014,
    VoiceServerCrashed = 4015,
    UnknownEncryptionMode = 4016,
}

impl VoiceCloseCode {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4006 => Some(Self::SessionNoLongerValid),
            4009 => Some(Self::SessionTimeout),
            4011 => Some(Self::ServerNotFound),
            4012 => Some(Self::UnknownProtocol),
            4014 => Some(Self::Disconnected),
            4015 => Some(Self::VoiceServerCrashed),
            4016 => Some(Self::UnknownEncryptionMode),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Reconnect policy for this close code
    #[must_use]
    pub const fn policy(self) -> ClosePolicy {
        match self {
            Self::UnknownOpcode
            | Self::DecodeError
            | Self::NotAuthenticated
            | Self::AlreadyAuthenticated
            | Self::VoiceServerCrashed => ClosePolicy::RESUME,
            Self::SessionNoLongerValid | Self::SessionTimeout => ClosePolicy::NEW_SESSION,
            Self::AuthenticationFailed
            | Self::ServerNotFound
            | Self::UnknownProtocol
            | Self::Disconnected
            | Self::UnknownEncryptionMode => ClosePolicy::TERMINAL,
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownOpcode => "Invalid opcode sent",
            Self::DecodeError => "Invalid payload encoding",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::SessionNoLongerValid => "Session no longer valid",
            Self::SessionTimeout => "Session timeout",
            Self::ServerNotFound => "Voice server not found",
            Self::UnknownProtocol => "Unknown protocol",
            Self::Disconnected => "Disconnected from channel",
            Self::VoiceServerCrashed => "Voice server crashed",
            Self::UnknownEncryptionMode => "Unknown encryption mode",
        }
    }
}

impl std::fmt::Display for VoiceCloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

/// Resolve the policy for a raw close code received from a voice gateway
#[must_use]
pub fn voice_close_policy(code: Option<u16>) -> ClosePolicy {
    match code {
        Some(code) if is_graceful(code) => ClosePolicy::NEW_SESSION,
        Some(code) => VoiceCloseCode::from_u16(code).map_or(ClosePolicy::RESUME, VoiceCloseCode::policy),
        None => ClosePolicy::RESUME,
    }
}
