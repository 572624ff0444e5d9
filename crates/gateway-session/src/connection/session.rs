//! Resumable session identity

use serde::{Deserialize, Serialize};

/// State needed to resume a dropped session
///
/// Created when the server confirms a fresh identify. Kept across reconnects
/// that allow resuming and cleared by close codes that forbid it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Server-assigned session ID
    pub id: String,

    /// Last sequence number received
    pub sequence: Option<u64>,

    /// Endpoint to dial when resuming, if different from the default
    pub endpoint: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, sequence: Option<u64>, endpoint: Option<String>) -> Self {
        Self {
            id: id.into(),
            sequence,
            endpoint,
        }
    }

    /// Record a sequence number, keeping the highest seen
    pub fn observe_sequence(&mut self, sequence: u64) {
        if self.sequence.map_or(true, |current| sequence > current) {
            self.sequence = Some(sequence);
        }
    }
}
