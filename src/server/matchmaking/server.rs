//! Rendezvous server actor.
//!
//! Owns the matchmaking queue and match registry, pairs players, gates the P2P start
//! on both sides having reported an address, and relays fallback chat. All mutation
//! goes through this actor's mailbox, so queue and registry never interleave.

use actix::prelude::*;
use std::collections::HashMap;
use std::time::Duration;
use log::{debug, info, warn};

use super::messages::{
    Connect, Disconnect, FindMatch, GetLobbyStats, LeaveQueue, LobbyStats, RelayChat,
    ReportConnectionInfo,
};
use super::queue::{JoinRejection, Lobby, ReportOutcome};
use super::types::{ConnectionId, Player};
use crate::config::matchmaking::STATS_INTERVAL_SECS;
use crate::protocol::{now_millis, Role, ServerMessage};
use crate::server::ws_error::{self, ErrorCode};

/// Main rendezvous server actor.
pub struct RendezvousServer {
    /// Queue and registry, mutated only from this actor's handlers.
    lobby: Lobby,
    /// Outgoing channel of every open signaling connection.
    sessions: HashMap<ConnectionId, Recipient<ServerMessage>>,
}

impl RendezvousServer {
    /// Create a new rendezvous server with an empty lobby.
    pub fn new() -> Self {
        Self {
            lobby: Lobby::new(),
            sessions: HashMap::new(),
        }
    }

    /// Send a message to one connection; unknown connections are skipped.
    fn send_to(&self, connection: ConnectionId, msg: ServerMessage) {
        match self.sessions.get(&connection) {
            Some(addr) => {
                debug!("[Rendezvous] -> {} {}", connection, msg.event_name());
                addr.do_send(msg);
            }
            None => debug!("[Rendezvous] Dropped {} for closed connection {}", msg.event_name(), connection),
        }
    }

    fn stats(&self) -> LobbyStats {
        LobbyStats {
            queued: self.lobby.queue().len(),
            active_matches: self.lobby.matches().len(),
            ready_matches: self.lobby.matches().ready_count(),
            connections: self.sessions.len(),
        }
    }

    /// Pair waiting players and announce every new match to both sides.
    fn pair_waiting_players(&mut self) {
        for created in self.lobby.try_pair() {
            let first = created.first.connection;
            let second = created.second.connection;
            self.send_to(
                first,
                ServerMessage::match_found(&created.match_id, created.second.public_info(), Role::Player1),
            );
            self.send_to(
                second,
                ServerMessage::match_found(&created.match_id, created.first.public_info(), Role::Player2),
            );
            self.send_to(first, ServerMessage::RequestConnectionInfo);
            self.send_to(second, ServerMessage::RequestConnectionInfo);
        }
    }

    /// Tell both sides of a ready match where to find each other.
    fn announce_ready(&self, match_id: &str) {
        let Some(m) = self.lobby.matches().get(match_id) else {
            return;
        };
        let (Some(a), Some(b)) = (m.slot_a.peer_info(), m.slot_b.peer_info()) else {
            warn!("[Rendezvous] Match {} marked ready without both addresses", match_id);
            return;
        };
        info!(
            "[Rendezvous] Match {}: {} at {} <-> {} at {}",
            match_id,
            a.player_name,
            a.endpoint(),
            b.player_name,
            b.endpoint()
        );
        self.send_to(
            m.slot_a.player.connection,
            ServerMessage::start_p2p(match_id, b.clone(), a.clone()),
        );
        self.send_to(m.slot_b.player.connection, ServerMessage::start_p2p(match_id, a, b));
    }

    /// Drop a connection from the queue and from its match, notifying the opponent.
    fn remove_connection(&mut self, connection: ConnectionId) {
        if let Some(player) = self.lobby.remove_from_queue(connection) {
            debug!("[Rendezvous] {} removed from queue", player.player_name);
        }
        if let Some(terminated) = self.lobby.remove_from_match(connection) {
            self.send_to(terminated.remaining.connection, ServerMessage::opponent_disconnected());
        }
    }
}

impl Default for RendezvousServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for RendezvousServer {
    type Context = Context<Self>;

    /// Starts the periodic statistics log.
    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(Duration::from_secs(STATS_INTERVAL_SECS), |act, _ctx| {
            let stats = act.stats();
            info!(
                "[Rendezvous] Stats: queue={} active_matches={} ready={} connections={}",
                stats.queued, stats.active_matches, stats.ready_matches, stats.connections
            );
        });
    }
}

impl Handler<Connect> for RendezvousServer {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) -> Self::Result {
        info!("[Rendezvous] Connection {} opened", msg.connection);
        self.sessions.insert(msg.connection, msg.addr);
    }
}

impl Handler<Disconnect> for RendezvousServer {
    type Result = ();

    /// Handles a closed connection: leaves the queue, tears down its match.
    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) -> Self::Result {
        info!("[Rendezvous] Connection {} closed", msg.connection);
        self.remove_connection(msg.connection);
        self.sessions.remove(&msg.connection);
    }
}

impl Handler<FindMatch> for RendezvousServer {
    type Result = ();

    /// Handles a player joining the queue, then tries to pair.
    fn handle(&mut self, msg: FindMatch, _ctx: &mut Self::Context) -> Self::Result {
        let player = Player::new(msg.connection, msg.request.player_id, msg.request.player_name);
        let name = player.player_name.clone();
        match self.lobby.join(player) {
            Ok(position) => {
                info!("[Rendezvous] {} joined queue at position {}", name, position);
                self.send_to(msg.connection, ServerMessage::queue_status(position));
                self.pair_waiting_players();
            }
            Err(rejection) => {
                let code = match rejection {
                    JoinRejection::AlreadyQueued => ErrorCode::AlreadyQueued,
                    JoinRejection::AlreadyInMatch => ErrorCode::AlreadyInMatch,
                    JoinRejection::DuplicatePlayer => ErrorCode::DuplicatePlayer,
                };
                debug!("[Rendezvous] Join from {} rejected: {:?}", msg.connection, rejection);
                self.send_to(msg.connection, ws_error::error_message(code));
            }
        }
    }
}

impl Handler<ReportConnectionInfo> for RendezvousServer {
    type Result = ();

    /// Handles an address report; announces the match once both sides reported.
    fn handle(&mut self, msg: ReportConnectionInfo, _ctx: &mut Self::Context) -> Self::Result {
        if !msg.info.is_valid() {
            self.send_to(msg.connection, ws_error::error_message(ErrorCode::InvalidConnectionInfo));
            return;
        }
        info!(
            "[Rendezvous] {} reported connection: {}:{}",
            msg.connection, msg.info.ip, msg.info.port
        );
        if let ReportOutcome::Ready(match_id) = self.lobby.report_address(msg.connection, msg.info) {
            self.announce_ready(&match_id);
        }
    }
}

impl Handler<LeaveQueue> for RendezvousServer {
    type Result = ();

    fn handle(&mut self, msg: LeaveQueue, _ctx: &mut Self::Context) -> Self::Result {
        if self.lobby.remove_from_queue(msg.connection).is_some() {
            info!("[Rendezvous] {} left queue", msg.connection);
        }
    }
}

impl Handler<RelayChat> for RendezvousServer {
    type Result = ();

    /// Forwards chat to the sender's opponent, stamped with the server time.
    fn handle(&mut self, msg: RelayChat, _ctx: &mut Self::Context) -> Self::Result {
        let request = msg.request;
        match self.lobby.relay_target(msg.connection, &request.target_player_id) {
            Some(target) => {
                debug!(
                    "[Rendezvous] Relay {} -> {}: {}",
                    request.sender_name, request.target_player_id, request.message
                );
                self.send_to(
                    target,
                    ServerMessage::P2pMessage {
                        sender_name: request.sender_name,
                        message: request.message,
                        timestamp: now_millis(),
                    },
                );
            }
            None => debug!(
                "[Rendezvous] Relay from {} to {} has no target in its match",
                msg.connection, request.target_player_id
            ),
        }
    }
}

impl Handler<GetLobbyStats> for RendezvousServer {
    type Result = MessageResult<GetLobbyStats>;

    fn handle(&mut self, _msg: GetLobbyStats, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.stats())
    }
}
