//! # gateway-session
//!
//! Client-side session layer for the event and voice WebSocket gateways:
//! connection state machine, heartbeats with nonce checks, reconnect with
//! linear backoff, identify concurrency buckets and the outbound command
//! limiter.

pub mod connection;
pub mod error;
pub mod protocol;
pub mod ratelimit;
pub mod shard;
pub mod voice;

pub use connection::{
    CloseNotice, ConnectionConfig, ConnectionState, GatewayConnection, GatewayEvent,
    ReconnectCoordinator, ReconnectPolicy, Session,
};
pub use error::{GatewayError, GatewayResult, ProtocolError};
pub use protocol::{EventGateway, GatewayIntents, GatewayMessage, GatewayProtocol, OpCode};
pub use ratelimit::{CommandRateLimiter, ConcurrencyBucketLimiter, RateLimitError};
pub use shard::{ShardEvent, ShardManager};
pub use voice::VoiceGateway;
