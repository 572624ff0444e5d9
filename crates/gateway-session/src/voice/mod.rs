//! Voice gateway protocol
//!
//! Op codes, close codes and payloads of the per-guild voice signalling
//! gateway, and the [`VoiceGateway`] protocol that drives a
//! [`GatewayConnection`](crate::GatewayConnection) against it.

mod close_codes;
mod gateway;
mod opcodes;
mod payloads;

pub use close_codes::{voice_close_policy, VoiceCloseCode};
pub use gateway::{VoiceGateway, VOICE_GATEWAY_VERSION};
pub use opcodes::VoiceOpCode;
pub use payloads::{
    SelectProtocolData, SelectProtocolPayload, SpeakingFlags, SpeakingPayload, VoiceHelloPayload,
    VoiceIdentifyPayload, VoiceReadyPayload, VoiceResumePayload,
};
