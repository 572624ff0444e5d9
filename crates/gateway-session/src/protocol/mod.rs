//! Gateway protocol definitions
//!
//! Frame envelope, event gateway op codes, close codes and payloads, and the
//! [`GatewayProtocol`] seam the connection state machine is generic over.

mod close_codes;
mod event_gateway;
mod gateway;
mod intents;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{
    event_close_policy, is_graceful, CloseCode, ClosePolicy, GOING_AWAY, CLIENT_RECONNECT,
    NORMAL_CLOSURE,
};
pub use event_gateway::{EventGateway, EVENT_GATEWAY_VERSION};
pub use gateway::{GatewayProtocol, Inbound, ReadyInfo};
pub use intents::GatewayIntents;
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, PresenceUpdatePayload, ReadyPayload,
    RequestGuildMembersPayload, ResumePayload, VoiceStateUpdatePayload,
};
