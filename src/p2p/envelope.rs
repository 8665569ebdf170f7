//! UDP datagram envelope exchanged directly between matched peers.
//!
//! One JSON object per datagram: `{"type": "chat"|"ping"|"pong", "sender", "message"?, "timestamp"}`.
//! No sequence numbers and no acknowledgment.

use serde::{Deserialize, Serialize};

use crate::protocol::now_millis;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum P2PEnvelope {
    Chat {
        sender: String,
        message: String,
        timestamp: u64,
    },
    Ping {
        sender: String,
        timestamp: u64,
    },
    Pong {
        sender: String,
        timestamp: u64,
    },
    /// Any other `type`; decoded so the receive loop can log and ignore it.
    #[serde(other)]
    Unknown,
}

impl P2PEnvelope {
    pub fn chat(sender: &str, message: &str) -> Self {
        Self::Chat {
            sender: sender.to_string(),
            message: message.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn ping(sender: &str) -> Self {
        Self::Ping {
            sender: sender.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn pong(sender: &str) -> Self {
        Self::Pong {
            sender: sender.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}
