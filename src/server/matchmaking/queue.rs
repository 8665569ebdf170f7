//! Matchmaking queue, match registry and the per-match readiness gate.
//!
//! [`Lobby`] owns both structures so that every mutation (joining, pairing,
//! address reporting, removal) happens in one place. It has no interior locking:
//! the rendezvous actor that owns it is its only writer.

use std::collections::{HashMap, VecDeque};

use log::{debug, info};

use super::types::{ConnectionId, Match, MatchId, MatchState, Player, generate_match_id};
use crate::protocol::ConnectionInfo;

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejection {
    /// This connection is already waiting.
    AlreadyQueued,
    /// This connection is already part of a match.
    AlreadyInMatch,
    /// Another connection is queued or matched under the same player id.
    DuplicatePlayer,
}

/// Result of reporting an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The connection is not part of any match.
    UnknownConnection,
    /// Address stored; the opponent has not reported yet.
    Waiting(MatchId),
    /// This report completed the match. Emitted exactly once per match.
    Ready(MatchId),
    /// The match was already ready; the report was ignored.
    AlreadyReady(MatchId),
}

/// FIFO queue of waiting players, arrival order preserved.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    players: VecDeque<Player>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains_connection(&self, connection: ConnectionId) -> bool {
        self.players.iter().any(|p| p.connection == connection)
    }

    pub fn contains_player_id(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.player_id == player_id)
    }

    /// Appends and returns the 1-based queue position.
    pub fn push(&mut self, player: Player) -> usize {
        self.players.push_back(player);
        self.players.len()
    }

    /// Removes the two longest-waiting players, if there are two.
    pub fn pop_pair(&mut self) -> Option<(Player, Player)> {
        if self.players.len() < 2 {
            return None;
        }
        let a = self.players.pop_front()?;
        let b = self.players.pop_front()?;
        Some((a, b))
    }

    /// Removes the player on `connection`, keeping the others in order.
    pub fn remove(&mut self, connection: ConnectionId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.connection == connection)?;
        self.players.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }
}

/// In-progress matches keyed by match id, indexed by connection.
#[derive(Debug, Default)]
pub struct MatchRegistry {
    matches: HashMap<MatchId, Match>,
    by_connection: HashMap<ConnectionId, MatchId>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn get(&self, match_id: &str) -> Option<&Match> {
        self.matches.get(match_id)
    }

    pub fn match_of(&self, connection: ConnectionId) -> Option<&Match> {
        self.by_connection
            .get(&connection)
            .and_then(|id| self.matches.get(id))
    }

    pub fn contains_player_id(&self, player_id: &str) -> bool {
        self.matches.values().any(|m| {
            m.slot_a.player.player_id == player_id || m.slot_b.player.player_id == player_id
        })
    }

    pub fn ready_count(&self) -> usize {
        self.matches.values().filter(|m| m.state == MatchState::Ready).count()
    }

    fn insert(&mut self, m: Match) {
        self.by_connection.insert(m.slot_a.player.connection, m.match_id.clone());
        self.by_connection.insert(m.slot_b.player.connection, m.match_id.clone());
        self.matches.insert(m.match_id.clone(), m);
    }

    fn report(&mut self, connection: ConnectionId, info: ConnectionInfo) -> ReportOutcome {
        let Some(match_id) = self.by_connection.get(&connection) else {
            return ReportOutcome::UnknownConnection;
        };
        let Some(m) = self.matches.get_mut(match_id) else {
            return ReportOutcome::UnknownConnection;
        };
        if m.state == MatchState::Ready {
            return ReportOutcome::AlreadyReady(m.match_id.clone());
        }
        if let Some(slot) = m.slot_of_mut(connection) {
            slot.address = Some(info);
        }
        if m.both_reported() {
            m.state = MatchState::Ready;
            ReportOutcome::Ready(m.match_id.clone())
        } else {
            ReportOutcome::Waiting(m.match_id.clone())
        }
    }

    fn remove_connection(&mut self, connection: ConnectionId) -> Option<Match> {
        let match_id = self.by_connection.remove(&connection)?;
        let mut m = self.matches.remove(&match_id)?;
        if let Some(other) = m.opponent_of(connection) {
            self.by_connection.remove(&other.player.connection);
        }
        m.state = MatchState::Terminated;
        Some(m)
    }
}

/// A freshly created match, ready to be announced to both sides.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub match_id: MatchId,
    pub first: Player,
    pub second: Player,
}

/// A match removed because one side left.
#[derive(Debug, Clone)]
pub struct TerminatedMatch {
    pub match_id: MatchId,
    pub state_before: MatchState,
    pub remaining: Player,
}

/// Queue and registry guarded as one unit.
#[derive(Debug, Default)]
pub struct Lobby {
    queue: MatchmakingQueue,
    matches: MatchRegistry,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self) -> &MatchmakingQueue {
        &self.queue
    }

    pub fn matches(&self) -> &MatchRegistry {
        &self.matches
    }

    /// Enqueues a player, rejecting duplicates of either the connection or the player id.
    pub fn join(&mut self, player: Player) -> Result<usize, JoinRejection> {
        if self.queue.contains_connection(player.connection) {
            return Err(JoinRejection::AlreadyQueued);
        }
        if self.matches.match_of(player.connection).is_some() {
            return Err(JoinRejection::AlreadyInMatch);
        }
        if self.queue.contains_player_id(&player.player_id)
            || self.matches.contains_player_id(&player.player_id)
        {
            return Err(JoinRejection::DuplicatePlayer);
        }
        debug!("[Rendezvous] {} ({}) joined queue", player.player_name, player.connection);
        Ok(self.queue.push(player))
    }

    /// Pairs the two oldest players while at least two are waiting.
    pub fn try_pair(&mut self) -> Vec<NewMatch> {
        let mut created = Vec::new();
        while let Some((first, second)) = self.queue.pop_pair() {
            let mut match_id = generate_match_id();
            while self.matches.get(&match_id).is_some() {
                match_id = generate_match_id();
            }
            info!(
                "[Rendezvous] Created {}: {} vs {}",
                match_id, first.player_name, second.player_name
            );
            self.matches.insert(Match::new(match_id.clone(), first.clone(), second.clone()));
            created.push(NewMatch { match_id, first, second });
        }
        created
    }

    /// Stores the address reported on `connection` and tells whether the match just became ready.
    pub fn report_address(&mut self, connection: ConnectionId, info: ConnectionInfo) -> ReportOutcome {
        let outcome = self.matches.report(connection, info);
        match &outcome {
            ReportOutcome::UnknownConnection => {
                debug!("[Rendezvous] Address report from {} outside any match ignored", connection);
            }
            ReportOutcome::Waiting(id) => {
                debug!("[Rendezvous] Match {} waiting for the other side's address", id);
            }
            ReportOutcome::Ready(id) => info!("[Rendezvous] Match {} - both players ready", id),
            ReportOutcome::AlreadyReady(id) => {
                debug!("[Rendezvous] Match {} already ready, repeated report from {} ignored", id, connection);
            }
        }
        outcome
    }

    pub fn remove_from_queue(&mut self, connection: ConnectionId) -> Option<Player> {
        self.queue.remove(connection)
    }

    /// Deletes the whole match `connection` belongs to and returns the other side.
    pub fn remove_from_match(&mut self, connection: ConnectionId) -> Option<TerminatedMatch> {
        let state_before = self.matches.match_of(connection)?.state;
        let m = self.matches.remove_connection(connection)?;
        let remaining = m.opponent_of(connection)?.player.clone();
        info!("[Rendezvous] Removed match {} ({:?}) after {} left", m.match_id, state_before, connection);
        Some(TerminatedMatch {
            match_id: m.match_id,
            state_before,
            remaining,
        })
    }

    /// Connection of `target_player_id`, only if it is `sender`'s opponent.
    pub fn relay_target(&self, sender: ConnectionId, target_player_id: &str) -> Option<ConnectionId> {
        let m = self.matches.match_of(sender)?;
        let opponent = m.opponent_of(sender)?;
        (opponent.player.player_id == target_player_id).then_some(opponent.player.connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn player(name: &str) -> Player {
        Player::new(ConnectionId::new(), Some(format!("id-{}", name)), Some(name.to_string()))
    }

    fn info(last: u8, port: u16) -> ConnectionInfo {
        ConnectionInfo { ip: Ipv4Addr::new(198, 51, 100, last), port }
    }

    #[test]
    fn test_fifo_pairing_leaves_third_queued() {
        let mut lobby = Lobby::new();
        let (a, b, c) = (player("A"), player("B"), player("C"));
        assert_eq!(lobby.join(a.clone()), Ok(1));
        assert_eq!(lobby.join(b.clone()), Ok(2));
        assert_eq!(lobby.join(c.clone()), Ok(3));

        let created = lobby.try_pair();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].first.connection, a.connection);
        assert_eq!(created[0].second.connection, b.connection);
        assert_eq!(lobby.queue().len(), 1);
        assert!(lobby.queue().contains_connection(c.connection));
    }

    #[test]
    fn test_fourth_player_forms_second_match() {
        let mut lobby = Lobby::new();
        let players: Vec<Player> = ["A", "B", "C", "D"].iter().map(|n| player(n)).collect();
        let mut created = Vec::new();
        for p in &players {
            lobby.join(p.clone()).unwrap();
            created.extend(lobby.try_pair());
        }
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].first.player_id, "id-A");
        assert_eq!(created[0].second.player_id, "id-B");
        assert_eq!(created[1].first.player_id, "id-C");
        assert_eq!(created[1].second.player_id, "id-D");
        assert_ne!(created[0].match_id, created[1].match_id);
        assert!(lobby.queue().is_empty());
        assert_eq!(lobby.matches().len(), 2);
    }

    #[test]
    fn test_removing_queued_player_keeps_order() {
        let mut lobby = Lobby::new();
        let (a, b, c) = (player("A"), player("B"), player("C"));
        lobby.join(a.clone()).unwrap();
        lobby.join(b.clone()).unwrap();
        // Pairing is deferred here to inspect the queue itself.
        let removed = lobby.remove_from_queue(a.connection).unwrap();
        assert_eq!(removed.player_id, "id-A");
        lobby.join(c.clone()).unwrap();

        let order: Vec<&str> = lobby.queue().iter().map(|p| p.player_id.as_str()).collect();
        assert_eq!(order, vec!["id-B", "id-C"]);
        let created = lobby.try_pair();
        assert_eq!(created[0].first.connection, b.connection);
        assert_eq!(created[0].second.connection, c.connection);
    }

    #[test]
    fn test_readiness_gate_fires_once() {
        let mut lobby = Lobby::new();
        let (a, b) = (player("A"), player("B"));
        lobby.join(a.clone()).unwrap();
        lobby.join(b.clone()).unwrap();
        let id = lobby.try_pair().remove(0).match_id;

        assert_eq!(lobby.report_address(a.connection, info(10, 40000)), ReportOutcome::Waiting(id.clone()));
        assert_eq!(lobby.report_address(a.connection, info(10, 40001)), ReportOutcome::Waiting(id.clone()));
        assert_eq!(lobby.report_address(b.connection, info(20, 41000)), ReportOutcome::Ready(id.clone()));
        assert_eq!(lobby.report_address(b.connection, info(20, 41000)), ReportOutcome::AlreadyReady(id.clone()));
        assert_eq!(lobby.report_address(a.connection, info(10, 40000)), ReportOutcome::AlreadyReady(id.clone()));

        let m = lobby.matches().get(&id).unwrap();
        assert_eq!(m.state, MatchState::Ready);
        // The second report before readiness replaced the first.
        assert_eq!(m.slot_of(a.connection).unwrap().address, Some(info(10, 40001)));
    }

    #[test]
    fn test_report_outside_match_is_ignored() {
        let mut lobby = Lobby::new();
        let a = player("A");
        lobby.join(a.clone()).unwrap();
        assert_eq!(lobby.report_address(a.connection, info(10, 40000)), ReportOutcome::UnknownConnection);
        assert_eq!(lobby.report_address(ConnectionId::new(), info(10, 40000)), ReportOutcome::UnknownConnection);
    }

    #[test]
    fn test_remove_from_match_returns_opponent_and_deletes() {
        let mut lobby = Lobby::new();
        let (a, b) = (player("A"), player("B"));
        lobby.join(a.clone()).unwrap();
        lobby.join(b.clone()).unwrap();
        let id = lobby.try_pair().remove(0).match_id;
        lobby.report_address(a.connection, info(10, 40000));

        let terminated = lobby.remove_from_match(b.connection).unwrap();
        assert_eq!(terminated.match_id, id);
        assert_eq!(terminated.state_before, MatchState::AwaitingInfo);
        assert_eq!(terminated.remaining.connection, a.connection);
        assert!(lobby.matches().is_empty());

        // The survivor's later report reaches no match.
        assert_eq!(lobby.report_address(a.connection, info(10, 40000)), ReportOutcome::UnknownConnection);
        assert!(lobby.remove_from_match(a.connection).is_none());
    }

    #[test]
    fn test_remove_from_ready_match_returns_opponent_and_deletes() {
        let mut lobby = Lobby::new();
        let (a, b) = (player("A"), player("B"));
        lobby.join(a.clone()).unwrap();
        lobby.join(b.clone()).unwrap();
        let id = lobby.try_pair().remove(0).match_id;
        lobby.report_address(a.connection, info(10, 40000));
        assert_eq!(lobby.report_address(b.connection, info(20, 41000)), ReportOutcome::Ready(id.clone()));

        let terminated = lobby.remove_from_match(a.connection).unwrap();
        assert_eq!(terminated.match_id, id);
        assert_eq!(terminated.state_before, MatchState::Ready);
        assert_eq!(terminated.remaining.connection, b.connection);
        assert!(lobby.matches().is_empty());
        assert_eq!(lobby.matches().ready_count(), 0);
        assert!(lobby.remove_from_match(b.connection).is_none());
    }

    #[test]
    fn test_duplicate_joins_are_rejected() {
        let mut lobby = Lobby::new();
        let a = player("A");
        lobby.join(a.clone()).unwrap();
        assert_eq!(lobby.join(a.clone()), Err(JoinRejection::AlreadyQueued));

        let same_id = Player::new(ConnectionId::new(), Some("id-A".into()), Some("Other".into()));
        assert_eq!(lobby.join(same_id), Err(JoinRejection::DuplicatePlayer));

        let b = player("B");
        lobby.join(b.clone()).unwrap();
        lobby.try_pair();
        assert_eq!(lobby.join(b.clone()), Err(JoinRejection::AlreadyInMatch));
        let b_again = Player::new(ConnectionId::new(), Some("id-B".into()), None);
        assert_eq!(lobby.join(b_again), Err(JoinRejection::DuplicatePlayer));
    }

    #[test]
    fn test_relay_target_only_within_match() {
        let mut lobby = Lobby::new();
        let (a, b, c) = (player("A"), player("B"), player("C"));
        lobby.join(a.clone()).unwrap();
        lobby.join(b.clone()).unwrap();
        lobby.try_pair();
        lobby.join(c.clone()).unwrap();

        assert_eq!(lobby.relay_target(a.connection, "id-B"), Some(b.connection));
        assert_eq!(lobby.relay_target(b.connection, "id-A"), Some(a.connection));
        assert_eq!(lobby.relay_target(a.connection, "id-C"), None);
        assert_eq!(lobby.relay_target(c.connection, "id-A"), None);
    }

    #[test]
    fn test_default_identity_from_connection() {
        let connection = ConnectionId::new();
        let p = Player::new(connection, None, Some(String::new()));
        assert_eq!(p.player_id, connection.to_string());
        assert_eq!(p.player_name, format!("Player_{}", &connection.to_string()[..5]));
    }

    #[test]
    fn test_match_id_format() {
        let id = generate_match_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "match");
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2].len(), 6);
    }
}
