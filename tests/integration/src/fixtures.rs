//! Test fixtures
//!
//! Scripts that tell the mock gateway how to behave on each connection, and
//! connection settings tuned for fast tests.

use gateway_session::voice::VoiceGateway;
use gateway_session::{ConnectionConfig, EventGateway, GatewayIntents, GatewayMessage, ReconnectPolicy};
use serde_json::json;
use std::time::Duration;

/// Session id the mock gateway hands out on the event gateway
pub const SESSION_ID: &str = "mock-session";

/// Voice session id used by [`voice_gateway`]
pub const VOICE_SESSION_ID: &str = "voice-session";

/// Bot token used by [`event_gateway`]
pub const TOKEN: &str = "test-token";

/// Which gateway the mock speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Event,
    Voice,
}

/// How the mock answers heartbeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge every heartbeat correctly
    Echo,
    /// Echo a nonce that was never sent (voice only)
    WrongNonce,
    /// Never acknowledge
    Silent,
}

/// One frame the mock sends after authentication
#[derive(Debug, Clone)]
pub enum ScriptFrame {
    Message(GatewayMessage),
    /// Text sent verbatim, decodable or not
    Raw(String),
}

/// Behaviour of the mock for one accepted connection
#[derive(Debug, Clone)]
pub struct ConnectionScript {
    pub hello_interval: Duration,
    pub ack: AckMode,
    /// Frames sent right after Ready or Resumed
    pub after_auth: Vec<ScriptFrame>,
    /// Close with this code once `after_auth` is sent
    pub close_after_auth: Option<u16>,
}

impl Default for ConnectionScript {
    fn default() -> Self {
        Self {
            hello_interval: Duration::from_secs(10),
            ack: AckMode::Echo,
            after_auth: Vec::new(),
            close_after_auth: None,
        }
    }
}

impl ConnectionScript {
    pub fn heartbeat_every(mut self, interval: Duration) -> Self {
        self.hello_interval = interval;
        self
    }

    pub fn ack(mut self, ack: AckMode) -> Self {
        self.ack = ack;
        self
    }

    pub fn then_send(mut self, message: GatewayMessage) -> Self {
        self.after_auth.push(ScriptFrame::Message(message));
        self
    }

    pub fn then_send_raw(mut self, text: impl Into<String>) -> Self {
        self.after_auth.push(ScriptFrame::Raw(text.into()));
        self
    }

    pub fn then_close(mut self, code: u16) -> Self {
        self.close_after_auth = Some(code);
        self
    }
}

/// A `MESSAGE_CREATE` dispatch with a sequence number
pub fn message_create(sequence: u64, content: &str) -> GatewayMessage {
    GatewayMessage::dispatch("MESSAGE_CREATE", sequence, json!({ "content": content }))
}

/// Event gateway protocol for a single unsharded session
pub fn event_gateway() -> EventGateway {
    EventGateway::new(TOKEN, GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES)
}

/// Voice gateway protocol for one guild
pub fn voice_gateway() -> VoiceGateway {
    VoiceGateway::new("guild-1", "user-1", VOICE_SESSION_ID, "voice-token")
}

/// Connection settings with short reconnect delays
pub fn fast_config(endpoint: impl Into<String>) -> ConnectionConfig {
    ConnectionConfig::new(endpoint)
        .with_dial_timeout(Duration::from_secs(2))
        .with_reconnect_policy(ReconnectPolicy::new(
            Duration::from_millis(50),
            Duration::from_millis(200),
        ))
}
