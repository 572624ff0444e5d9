//! Event gateway protocol (v10)

use super::{
    event_close_policy, ClosePolicy, GatewayIntents, GatewayMessage, GatewayProtocol, HelloPayload,
    IdentifyPayload, IdentifyProperties, Inbound, OpCode, PresenceUpdatePayload, ReadyInfo,
    ReadyPayload, ResumePayload,
};
use crate::connection::Session;
use crate::error::ProtocolError;
use serde_json::Value;
use std::time::Duration;

/// Event gateway protocol version
pub const EVENT_GATEWAY_VERSION: u8 = 10;

/// Event gateway for one shard
#[derive(Clone)]
pub struct EventGateway {
    token: String,
    intents: GatewayIntents,
    shard: Option<[u32; 2]>,
    properties: IdentifyProperties,
    large_threshold: Option<u32>,
    presence: Option<PresenceUpdatePayload>,
}

impl EventGateway {
    /// Unsharded gateway with a token and intents
    #[must_use]
    pub fn new(token: impl Into<String>, intents: GatewayIntents) -> Self {
        Self {
            token: token.into(),
            intents,
            shard: None,
            properties: IdentifyProperties::new(),
            large_threshold: None,
            presence: None,
        }
    }

    /// Run as shard `id` of `count`
    #[must_use]
    pub fn with_shard(mut self, id: u32, count: u32) -> Self {
        self.shard = Some([id, count]);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = Some(threshold);
        self
    }

    /// Presence announced with every identify
    #[must_use]
    pub fn with_presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = Some(presence);
        self
    }

    /// `[shard_id, shard_count]`, if sharded
    #[must_use]
    pub fn shard(&self) -> Option<[u32; 2]> {
        self.shard
    }

    #[must_use]
    pub fn intents(&self) -> GatewayIntents {
        self.intents
    }
}

impl std::fmt::Debug for EventGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventGateway")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("shard", &self.shard)
            .finish()
    }
}

fn invalid(op: OpCode, source: serde_json::Error) -> ProtocolError {
    ProtocolError::InvalidPayload {
        op: op.as_u8(),
        source,
    }
}

impl GatewayProtocol for EventGateway {
    fn name(&self) -> &'static str {
        "event"
    }

    fn version(&self) -> u8 {
        EVENT_GATEWAY_VERSION
    }

    fn shard_id(&self) -> Option<u32> {
        Some(self.shard.map_or(0, |[id, _]| id))
    }

    fn classify(&self, message: &GatewayMessage) -> Result<Inbound, ProtocolError> {
        let Some(op) = u8::try_from(message.op).ok().and_then(OpCode::from_u8) else {
            return Ok(Inbound::Forward);
        };

        let inbound = match op {
            OpCode::Hello => {
                let hello: HelloPayload = message.data_as().map_err(|e| invalid(op, e))?;
                Inbound::Hello {
                    interval: Duration::from_millis(hello.heartbeat_interval),
                }
            }
            OpCode::HeartbeatAck => Inbound::HeartbeatAck(None),
            OpCode::Heartbeat => Inbound::HeartbeatRequest,
            OpCode::Reconnect => Inbound::Reconnect,
            OpCode::InvalidSession => Inbound::InvalidSession {
                resumable: message.d.as_bool().unwrap_or(false),
            },
            OpCode::Dispatch => match message.t.as_deref() {
                Some("READY") => {
                    let ready: ReadyPayload = message.data_as().map_err(|e| invalid(op, e))?;
                    Inbound::Ready(ReadyInfo {
                        session_id: ready.session_id,
                        resume_url: ready.resume_gateway_url,
                    })
                }
                Some("RESUMED") => Inbound::Resumed,
                _ => Inbound::Forward,
            },
            _ => Inbound::Forward,
        };

        Ok(inbound)
    }

    fn identify(&self) -> Result<GatewayMessage, ProtocolError> {
        let payload = IdentifyPayload {
            token: self.token.clone(),
            intents: self.intents,
            properties: self.properties.clone(),
            shard: self.shard,
            large_threshold: self.large_threshold,
            presence: self.presence.clone(),
        };
        Ok(GatewayMessage::with_payload(OpCode::Identify, &payload)?)
    }

    fn resume(&self, session: &Session) -> Result<GatewayMessage, ProtocolError> {
        let payload = ResumePayload {
            token: self.token.clone(),
            session_id: session.id.clone(),
            seq: session.sequence,
        };
        Ok(GatewayMessage::with_payload(OpCode::Resume, &payload)?)
    }

    fn heartbeat(&self, _nonce: u64, sequence: Option<u64>) -> GatewayMessage {
        // The event gateway acks without echoing anything, so the payload is
        // the last sequence number rather than the nonce.
        GatewayMessage::new(OpCode::Heartbeat, sequence.map_or(Value::Null, Value::from))
    }

    fn close_policy(&self, code: Option<u16>) -> ClosePolicy {
        event_close_policy(code)
    }
}
