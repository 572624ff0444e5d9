//! Voice gateway protocol (v4)
//!
//! Runs on the same connection state machine as the event gateway. The
//! differences are all here: op codes, a nonce that the server echoes back in
//! its heartbeat acknowledgement, a fractional Hello interval and its own
//! close-code table.

use super::{
    voice_close_policy, VoiceHelloPayload, VoiceIdentifyPayload, VoiceOpCode, VoiceReadyPayload,
    VoiceResumePayload,
};
use crate::connection::Session;
use crate::error::ProtocolError;
use crate::protocol::{ClosePolicy, GatewayMessage, GatewayProtocol, Inbound, ReadyInfo};
use serde::de::Error as _;
use std::time::Duration;

/// Voice gateway protocol version
pub const VOICE_GATEWAY_VERSION: u8 = 4;

/// Voice gateway for one guild's voice session
///
/// Built from the event gateway's voice state and voice server updates.
#[derive(Clone)]
pub struct VoiceGateway {
    server_id: String,
    user_id: String,
    session_id: String,
    token: String,
}

impl VoiceGateway {
    #[must_use]
    pub fn new(
        server_id: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            token: token.into(),
        }
    }

    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl std::fmt::Debug for VoiceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceGateway")
            .field("server_id", &self.server_id)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

fn invalid(op: VoiceOpCode, source: serde_json::Error) -> ProtocolError {
    ProtocolError::InvalidPayload {
        op: op.as_u8(),
        source,
    }
}

fn hello_interval(hello: &VoiceHelloPayload) -> Result<Duration, serde_json::Error> {
    let millis = hello.heartbeat_interval;
    if !(millis.is_finite() && millis > 0.0) {
        return Err(serde_json::Error::custom(format!(
            "heartbeat_interval must be positive, got {millis}"
        )));
    }
    Duration::try_from_secs_f64(millis / 1000.0).map_err(serde_json::Error::custom)
}

impl GatewayProtocol for VoiceGateway {
    fn name(&self) -> &'static str {
        "voice"
    }

    fn version(&self) -> u8 {
        VOICE_GATEWAY_VERSION
    }

    /// Voice endpoints arrive as bare `host:port`; `wss://` is assumed
    fn url(&self, endpoint: &str) -> String {
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("wss://{endpoint}")
        };
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        format!("{endpoint}{separator}v={}", self.version())
    }

    fn classify(&self, message: &GatewayMessage) -> Result<Inbound, ProtocolError> {
        let Some(op) = u8::try_from(message.op).ok().and_then(VoiceOpCode::from_u8) else {
            return Ok(Inbound::Forward);
        };

        let inbound = match op {
            VoiceOpCode::Hello => {
                let hello: VoiceHelloPayload = message.data_as().map_err(|e| invalid(op, e))?;
                Inbound::Hello {
                    interval: hello_interval(&hello).map_err(|e| invalid(op, e))?,
                }
            }
            VoiceOpCode::HeartbeatAck => {
                let nonce: u64 = message.data_as().map_err(|e| invalid(op, e))?;
                Inbound::HeartbeatAck(Some(nonce))
            }
            VoiceOpCode::Ready => {
                // Validated here; the media collaborator reads it from the
                // forwarded frame.
                let _: VoiceReadyPayload = message.data_as().map_err(|e| invalid(op, e))?;
                Inbound::Ready(ReadyInfo {
                    session_id: self.session_id.clone(),
                    resume_url: None,
                })
            }
            VoiceOpCode::Resumed => Inbound::Resumed,
            _ => Inbound::Forward,
        };

        Ok(inbound)
    }

    fn identify(&self) -> Result<GatewayMessage, ProtocolError> {
        let payload = VoiceIdentifyPayload {
            server_id: self.server_id.clone(),
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            token: self.token.clone(),
        };
        Ok(GatewayMessage::with_payload(VoiceOpCode::Identify, &payload)?)
    }

    fn resume(&self, session: &Session) -> Result<GatewayMessage, ProtocolError> {
        let payload = VoiceResumePayload {
            server_id: self.server_id.clone(),
            session_id: session.id.clone(),
            token: self.token.clone(),
        };
        Ok(GatewayMessage::with_payload(VoiceOpCode::Resume, &payload)?)
    }

    fn heartbeat(&self, nonce: u64, _sequence: Option<u64>) -> GatewayMessage {
        GatewayMessage::new(VoiceOpCode::Heartbeat, serde_json::Value::from(nonce))
    }

    fn close_policy(&self, code: Option<u16>) -> ClosePolicy {
        voice_close_policy(code)
    }
}
