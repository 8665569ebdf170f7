use std::fmt;
use std::time::Instant;

use rand::Rng;
use uuid::Uuid;

use crate::config::matchmaking::{DEFAULT_NAME_PREFIX_LEN, MATCH_ID_SUFFIX_LEN};
use crate::protocol::{ConnectionInfo, OpponentInfo, PeerInfo};

/// Identifies one signaling connection for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub type MatchId = String;

/// A player waiting in the queue, or the snapshot of one inside a match.
#[derive(Clone, Debug)]
pub struct Player {
    pub connection: ConnectionId,
    pub player_id: String,
    pub player_name: String,
    pub join_time: Instant,
}

impl Player {
    /// Builds a player, deriving missing id/name from the connection id.
    pub fn new(connection: ConnectionId, player_id: Option<String>, player_name: Option<String>) -> Self {
        let player_id = player_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| connection.to_string());
        let player_name = player_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                let id = connection.to_string();
                format!("Player_{}", &id[..DEFAULT_NAME_PREFIX_LEN])
            });
        Self {
            connection,
            player_id,
            player_name,
            join_time: Instant::now(),
        }
    }

    pub fn public_info(&self) -> OpponentInfo {
        OpponentInfo {
            player_id: self.player_id.clone(),
            player_name: self.player_name.clone(),
        }
    }
}

/// One side of a match.
#[derive(Clone, Debug)]
pub struct MatchSlot {
    pub player: Player,
    pub address: Option<ConnectionInfo>,
}

impl MatchSlot {
    fn new(player: Player) -> Self {
        Self { player, address: None }
    }

    /// Identity plus reported address; `None` until the address is set.
    pub fn peer_info(&self) -> Option<PeerInfo> {
        self.address.map(|addr| PeerInfo {
            player_id: self.player.player_id.clone(),
            player_name: self.player.player_name.clone(),
            ip: addr.ip,
            port: addr.port,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchState {
    AwaitingInfo,
    Ready,
    Terminated,
}

/// Two distinct players paired together, plus what each reported about itself.
#[derive(Clone, Debug)]
pub struct Match {
    pub match_id: MatchId,
    pub slot_a: MatchSlot,
    pub slot_b: MatchSlot,
    pub created_at: Instant,
    pub state: MatchState,
}

impl Match {
    pub fn new(match_id: MatchId, a: Player, b: Player) -> Self {
        Self {
            match_id,
            slot_a: MatchSlot::new(a),
            slot_b: MatchSlot::new(b),
            created_at: Instant::now(),
            state: MatchState::AwaitingInfo,
        }
    }

    pub fn both_reported(&self) -> bool {
        self.slot_a.address.is_some() && self.slot_b.address.is_some()
    }

    pub fn slot_of(&self, connection: ConnectionId) -> Option<&MatchSlot> {
        if self.slot_a.player.connection == connection {
            Some(&self.slot_a)
        } else if self.slot_b.player.connection == connection {
            Some(&self.slot_b)
        } else {
            None
        }
    }

    pub fn slot_of_mut(&mut self, connection: ConnectionId) -> Option<&mut MatchSlot> {
        if self.slot_a.player.connection == connection {
            Some(&mut self.slot_a)
        } else if self.slot_b.player.connection == connection {
            Some(&mut self.slot_b)
        } else {
            None
        }
    }

    /// The slot that is not `connection`'s.
    pub fn opponent_of(&self, connection: ConnectionId) -> Option<&MatchSlot> {
        if self.slot_a.player.connection == connection {
            Some(&self.slot_b)
        } else if self.slot_b.player.connection == connection {
            Some(&self.slot_a)
        } else {
            None
        }
    }
}

/// `match_<unix millis>_<6 random base36 chars>`.
pub fn generate_match_id() -> MatchId {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..MATCH_ID_SUFFIX_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("match_{}_{}", crate::protocol::now_millis(), suffix)
}
