//! Error types for the gateway session layer

use crate::ratelimit::RateLimitError;

/// Errors returned by gateway connections
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// `open` was called while a socket is already held
    #[error("Connection already open")]
    AlreadyConnected,

    /// No socket is held
    #[error("Not connected")]
    NotConnected,

    /// A deadline passed before the operation completed
    #[error("Timed out: {0}")]
    Timeout(&'static str),

    /// `WebSocket` transport error
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed frame or payload
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Rate limiter refused a permit in time
    #[error("Rate limit: {0}")]
    RateLimit(#[from] RateLimitError),

    /// Cancelled by the caller or by `close`
    #[error("Cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Whether the error is a caller mistake that retrying cannot fix
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::AlreadyConnected)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Errors decoding or encoding protocol payloads
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A known op code carried a payload of the wrong shape
    #[error("Invalid payload for op {op}: {source}")]
    InvalidPayload {
        op: u8,
        #[source]
        source: serde_json::Error,
    },

    /// An outbound payload could not be encoded
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
