/// Matchmaking configuration constants.
/// 
/// This module defines parameters for the rendezvous lobby, such as the pairing size,
/// connection timeouts, and the interval of the statistics log line.
pub const PLAYERS_PER_MATCH: usize = 2; // Matches are strictly 1v1.

/// Time (in seconds) before a silent signaling connection is considered gone.
pub const CLIENT_TIMEOUT_SECS: u64 = 60;

/// Interval (in seconds) between server-initiated websocket pings.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Interval (in seconds) between queue/match statistics log lines.
pub const STATS_INTERVAL_SECS: u64 = 10;

/// Number of random base36 characters appended to a match id.
pub const MATCH_ID_SUFFIX_LEN: usize = 6;

/// Number of connection-id characters used for a default player name.
pub const DEFAULT_NAME_PREFIX_LEN: usize = 5;
