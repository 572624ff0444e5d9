//! Voice gateway payload definitions

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Payload for op 8 (Hello)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceHelloPayload {
    /// Heartbeat interval in milliseconds; fractional on this gateway
    pub heartbeat_interval: f64,
}

/// Payload for op 0 (Identify)
#[derive(Clone, Serialize, Deserialize)]
pub struct VoiceIdentifyPayload {
    pub server_id: String,
    pub user_id: String,
    /// Session id from the event gateway's voice state update
    pub session_id: String,
    /// Token from the event gateway's voice server update
    pub token: String,
}

impl std::fmt::Debug for VoiceIdentifyPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceIdentifyPayload")
            .field("server_id", &self.server_id)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Payload for op 7 (Resume)
#[derive(Clone, Serialize, Deserialize)]
pub struct VoiceResumePayload {
    pub server_id: String,
    pub session_id: String,
    pub token: String,
}

impl std::fmt::Debug for VoiceResumePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceResumePayload")
            .field("server_id", &self.server_id)
            .field("session_id", &self.session_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Payload for op 2 (Ready)
///
/// Where the media collaborator should send its UDP traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceReadyPayload {
    pub ssrc: u32,
    pub ip: String,
    pub port: u16,
    /// Supported encryption modes
    #[serde(default)]
    pub modes: Vec<String>,
}

/// Payload for op 1 (Select Protocol)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectProtocolPayload {
    pub protocol: String,
    pub data: SelectProtocolData,
}

/// Externally visible address found by IP discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectProtocolData {
    pub address: String,
    pub port: u16,
    pub mode: String,
}

impl SelectProtocolPayload {
    /// Select UDP transport with a discovered address and encryption mode
    #[must_use]
    pub fn udp(address: impl Into<String>, port: u16, mode: impl Into<String>) -> Self {
        Self {
            protocol: "udp".to_string(),
            data: SelectProtocolData {
                address: address.into(),
                port,
                mode: mode.into(),
            },
        }
    }
}

bitflags! {
    /// Speaking modes, sent as an integer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpeakingFlags: u8 {
        const MICROPHONE = 1 << 0;
        const SOUNDSHARE = 1 << 1;
        const PRIORITY   = 1 << 2;
    }
}

impl Serialize for SpeakingFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for SpeakingFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        u8::deserialize(deserializer).map(Self::from_bits_truncate)
    }
}

/// Payload for op 5 (Speaking)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakingPayload {
    pub speaking: SpeakingFlags,
    #[serde(default)]
    pub delay: u32,
    pub ssrc: u32,
}

impl SpeakingPayload {
    #[must_use]
    pub fn new(speaking: SpeakingFlags, ssrc: u32) -> Self {
        Self {
            speaking,
            delay: 0,
            ssrc,
        }
    }
}
