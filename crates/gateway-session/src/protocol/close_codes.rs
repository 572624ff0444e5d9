//! WebSocket close codes
//!
//! Maps event gateway close codes to the reconnect policy the client follows.

use serde::{Deserialize, Serialize};

/// Normal closure
pub const NORMAL_CLOSURE: u16 = 1000;
/// Endpoint going away
pub const GOING_AWAY: u16 = 1001;
/// Close code the client sends when it drops a socket in order to reconnect
///
/// Used for heartbeat liveness failures and server reconnect requests. Never
/// sent by the server and outside every vendor-defined range, so it keeps the
/// session resumable.
pub const CLIENT_RECONNECT: u16 = 4900;

/// What a close code allows the client to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePolicy {
    /// The client may open a new socket
    pub may_reconnect: bool,
    /// The stored session must be discarded; the next open identifies fresh
    pub invalidates_session: bool,
}

impl ClosePolicy {
    /// Reconnect and resume the existing session
    pub const RESUME: Self = Self {
        may_reconnect: true,
        invalidates_session: false,
    };

    /// Reconnect with a fresh identify
    pub const NEW_SESSION: Self = Self {
        may_reconnect: true,
        invalidates_session: true,
    };

    /// Do not reconnect
    pub const TERMINAL: Self = Self {
        may_reconnect: false,
        invalidates_session: true,
    };

    /// Whether the next open should resume rather than identify
    #[must_use]
    pub const fn resumes(self) -> bool {
        self.may_reconnect && !self.invalidates_session
    }
}

/// Check whether a code is a conventional graceful close (1000 or 1001)
///
/// Graceful closes always invalidate the session.
#[must_use]
pub const fn is_graceful(code: u16) -> bool {
    matches!(code, NORMAL_CLOSURE | GOING_AWAY)
}

/// Event gateway close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred
    UnknownError = 4000,
    /// Invalid opcode sent
    UnknownOpcode = 4001,
    /// Invalid payload encoding (JSON decode error)
    DecodeError = 4002,
    /// Sent payload before Identify
    NotAuthenticated = 4003,
    /// Invalid token provided
    AuthenticationFailed = 4004,
    /// Sent Identify twice
    AlreadyAuthenticated = 4005,
    /// Invalid sequence number for Resume
    InvalidSequence = 4007,
    /// Too many requests (rate limited)
    RateLimited = 4008,
    /// Session has timed out
    SessionTimeout = 4009,
    /// Invalid shard configuration
    InvalidShard = 4010,
    /// Sharding is required
    ShardingRequired = 4011,
    /// Invalid/outdated API version
    InvalidApiVersion = 4012,
    /// Invalid intent bits
    InvalidIntents = 4013,
    /// Intent not enabled for the application
    DisallowedIntents = 4014,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimeout),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            4012 => Some(Self::InvalidApiVersion),
            4013 => Some(Self::InvalidIntents),
            4014 => Some(Self::DisallowedIntents),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Reconnect policy for this close code
    #[must_use]
    pub const fn policy(self) -> ClosePolicy {
        match self {
            Self::UnknownError
            | Self::UnknownOpcode
            | Self::DecodeError
            | Self::NotAuthenticated
            | Self::AlreadyAuthenticated
            | Self::RateLimited => ClosePolicy::RESUME,
            Self::InvalidSequence | Self::SessionTimeout => ClosePolicy::NEW_SESSION,
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion
            | Self::InvalidIntents
            | Self::DisallowedIntents => ClosePolicy::TERMINAL,
        }
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error occurred",
            Self::UnknownOpcode => "Invalid opcode sent",
            Self::DecodeError => "Invalid payload encoding",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::InvalidSequence => "Invalid sequence number",
            Self::RateLimited => "Rate limited",
            Self::SessionTimeout => "Session timeout",
            Self::InvalidShard => "Invalid shard configuration",
            Self::ShardingRequired => "Sharding required",
            Self::InvalidApiVersion => "Invalid API version",
            Self::InvalidIntents => "Invalid intents",
            Self::DisallowedIntents => "Disallowed intents",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UnknownError => "UnknownError",
            Self::UnknownOpcode => "UnknownOpcode",
            Self::DecodeError => "DecodeError",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::AlreadyAuthenticated => "AlreadyAuthenticated",
            Self::InvalidSequence => "InvalidSequence",
            Self::RateLimited => "RateLimited",
            Self::SessionTimeout => "SessionTimeout",
            Self::InvalidShard => "InvalidShard",
            Self::ShardingRequired => "ShardingRequired",
            Self::InvalidApiVersion => "InvalidApiVersion",
            Self::InvalidIntents => "InvalidIntents",
            Self::DisallowedIntents => "DisallowedIntents",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

/// Resolve the policy for a raw close code received from the event gateway
///
/// `None` means the socket failed without a close frame. Such failures and
/// codes missing from the table are treated as transient and resumable.
#[must_use]
pub fn event_close_policy(code: Option<u16>) -> ClosePolicy {
    match code {
        Some(code) if is_graceful(code) => ClosePolicy::NEW_SESSION,
        Some(code) => CloseCode::from_u16(code).map_or(ClosePolicy::RESUME, CloseCode::policy),
        None => ClosePolicy::RESUME,
    }
}
