//! Actor messages accepted by the rendezvous server.
//!
//! The websocket session decodes wire frames into these and forwards them; the
//! server answers through the `Recipient<ServerMessage>` registered on connect.

use actix::prelude::*;

use super::types::ConnectionId;
use crate::protocol::{ConnectionInfo, FindMatchRequest, RelayRequest, ServerMessage};

/// Message: a signaling connection opened.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub connection: ConnectionId,
    pub addr: Recipient<ServerMessage>,
}

/// Message: a signaling connection closed (or timed out).
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub connection: ConnectionId,
}

/// Message: player asks to be queued.
#[derive(Message)]
#[rtype(result = "()")]
pub struct FindMatch {
    pub connection: ConnectionId,
    pub request: FindMatchRequest,
}

/// Message: player reports the address it discovered.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ReportConnectionInfo {
    pub connection: ConnectionId,
    pub info: ConnectionInfo,
}

/// Message: player leaves the queue.
#[derive(Message)]
#[rtype(result = "()")]
pub struct LeaveQueue {
    pub connection: ConnectionId,
}

/// Message: chat relayed through the signaling channel.
#[derive(Message)]
#[rtype(result = "()")]
pub struct RelayChat {
    pub connection: ConnectionId,
    pub request: RelayRequest,
}

/// Snapshot of the lobby for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyStats {
    pub queued: usize,
    pub active_matches: usize,
    pub ready_matches: usize,
    pub connections: usize,
}

/// Message: read the current lobby statistics.
#[derive(Message)]
#[rtype(result = "LobbyStats")]
pub struct GetLobbyStats;
