//! Signaling-channel wire protocol.
//!
//! Every frame on the signaling websocket is a JSON text frame of the form
//! `{"event": "<name>", "data": { ... }}`. Payload-less events omit `data`.
//! Frames are decoded once, at the channel boundary, into [`ClientMessage`] or
//! [`ServerMessage`]; anything that does not match a known schema is rejected there.

use std::net::{Ipv4Addr, SocketAddrV4};

use actix::prelude::*;
use serde::{Deserialize, Serialize};

/// Public identity of a player, as shown to its opponent before addresses are known.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpponentInfo {
    pub player_id: String,
    pub player_name: String,
}

/// Identity plus the address a player reported for itself.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub player_id: String,
    pub player_name: String,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerInfo {
    pub fn endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

/// The address a peer believes reaches it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl ConnectionInfo {
    /// Port 0 can never be reached and is treated as "no address".
    pub fn is_valid(&self) -> bool {
        self.port != 0
    }
}

impl From<SocketAddrV4> for ConnectionInfo {
    fn from(addr: SocketAddrV4) -> Self {
        Self { ip: *addr.ip(), port: addr.port() }
    }
}

impl From<ConnectionInfo> for SocketAddrV4 {
    fn from(info: ConnectionInfo) -> Self {
        SocketAddrV4::new(info.ip, info.port)
    }
}

/// Payload of `findMatch`. Both fields may be omitted; the server then derives
/// them from the connection id.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FindMatchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

/// Payload of a client-sent `p2pMessage` (relay fallback).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub target_player_id: String,
    pub message: String,
    pub sender_name: String,
}

/// Which side of the match a player is on.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player1,
    Player2,
}

// Message client -> server
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    FindMatch(FindMatchRequest),
    ConnectionInfo(ConnectionInfo),
    P2pMessage(RelayRequest),
    LeaveQueue,
}

// Message server -> client
#[derive(Message, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[rtype(result = "()")]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    QueueStatus {
        message: String,
        position: usize,
    },
    #[serde(rename_all = "camelCase")]
    MatchFound {
        match_id: String,
        opponent: OpponentInfo,
        your_role: Role,
        message: String,
    },
    RequestConnectionInfo,
    #[serde(rename = "startP2P", rename_all = "camelCase")]
    StartP2P {
        match_id: String,
        opponent: PeerInfo,
        your_info: PeerInfo,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    P2pMessage {
        sender_name: String,
        message: String,
        timestamp: u64,
    },
    OpponentDisconnected {
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn queue_status(position: usize) -> Self {
        Self::QueueStatus {
            message: "Searching for opponent...".to_string(),
            position,
        }
    }

    pub fn match_found(match_id: &str, opponent: OpponentInfo, your_role: Role) -> Self {
        Self::MatchFound {
            match_id: match_id.to_string(),
            opponent,
            your_role,
            message: "Match found! Getting connection info...".to_string(),
        }
    }

    pub fn start_p2p(match_id: &str, opponent: PeerInfo, your_info: PeerInfo) -> Self {
        Self::StartP2P {
            match_id: match_id.to_string(),
            opponent,
            your_info,
            message: "Start P2P connection!".to_string(),
        }
    }

    pub fn opponent_disconnected() -> Self {
        Self::OpponentDisconnected {
            message: "Your opponent disconnected".to_string(),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Event name as it appears on the wire, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::QueueStatus { .. } => "queueStatus",
            Self::MatchFound { .. } => "matchFound",
            Self::RequestConnectionInfo => "requestConnectionInfo",
            Self::StartP2P { .. } => "startP2P",
            Self::P2pMessage { .. } => "p2pMessage",
            Self::OpponentDisconnected { .. } => "opponentDisconnected",
            Self::Error { .. } => "error",
        }
    }
}

/// Milliseconds since the Unix epoch, as carried in `timestamp` fields.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
