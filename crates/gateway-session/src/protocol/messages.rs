//! Gateway message format
//!
//! Frame envelope shared by the event and voice gateways.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway message format
///
/// Every frame on either gateway has the shape `{"op": <int>, "d": <payload>}`.
/// The event gateway adds `s` and `t` on dispatches. The op code stays a raw
/// integer here so one envelope serves both op code tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    ///
    /// Wider than any known table so unfamiliar op codes still decode and
    /// can be forwarded.
    pub op: u16,

    /// Event data payload, `null` when absent
    #[serde(default)]
    pub d: Value,

    /// Sequence number (only for event dispatches)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event type (only for event dispatches)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayMessage {
    /// Create a message with an op code and payload
    #[must_use]
    pub fn new(op: impl Into<u16>, d: Value) -> Self {
        Self {
            op: op.into(),
            d,
            s: None,
            t: None,
        }
    }

    /// Create a message from a serializable payload
    pub fn with_payload<T: Serialize>(op: impl Into<u16>, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(op, serde_json::to_value(payload)?))
    }

    /// Create a dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: 0,
            d: data,
            s: Some(sequence),
            t: Some(event_type.into()),
        }
    }

    /// Decode the payload into a typed struct
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.d)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
