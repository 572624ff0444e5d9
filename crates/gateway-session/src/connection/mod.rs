//! Gateway connection lifecycle
//!
//! The state machine, its heartbeat and reconnect helpers, and the types a
//! consumer sees: configuration, events and the stored session.

mod config;
mod connection;
mod event;
mod heartbeat;
mod reconnect;
mod session;
mod state;

pub use config::ConnectionConfig;
pub use connection::GatewayConnection;
pub use event::{CloseNotice, GatewayEvent};
pub use heartbeat::{HeartbeatError, HeartbeatState};
pub use reconnect::{ReconnectCoordinator, ReconnectPolicy};
pub use session::Session;
pub use state::ConnectionState;
