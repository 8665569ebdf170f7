use std::time::{Duration, Instant};
use log::warn;

use crate::config::anti_spam::{BAN_DURATION_SECONDS, MAX_REQUESTS_PER_SECOND};

/// Tracks request flooding for a single signaling connection.
pub struct AntiSpamState {
    // Timestamp of last reset (for per-second counters)
    last_tick: Instant,
    // Number of requests received in the current second
    requests_this_tick: u32,
    max_requests_per_second: u32,
    ban_duration: Duration,
    // Ban state
    banned_until: Option<Instant>,
}

impl AntiSpamState {
    pub fn new() -> Self {
        Self::with_limits(MAX_REQUESTS_PER_SECOND, Duration::from_secs(BAN_DURATION_SECONDS))
    }

    pub fn with_limits(max_requests_per_second: u32, ban_duration: Duration) -> Self {
        Self {
            last_tick: Instant::now(),
            requests_this_tick: 0,
            max_requests_per_second,
            ban_duration,
            banned_until: None,
        }
    }

    /// Call at the start of every incoming message.
    /// Returns true if the connection is (now) banned.
    pub fn record_request(&mut self, connection: &str) -> bool {
        if self.is_banned() {
            return true;
        }
        self.tick();
        self.requests_this_tick += 1;
        if self.requests_this_tick > self.max_requests_per_second {
            self.ban(connection, "Too many requests per second");
            return true;
        }
        false
    }

    /// Returns true if the connection is currently banned.
    pub fn is_banned(&self) -> bool {
        self.banned_until.is_some_and(|until| Instant::now() < until)
    }

    /// Returns the remaining ban duration in seconds, or 0 if not banned.
    pub fn ban_remaining_secs(&self) -> u64 {
        self.banned_until
            .map(|until| until.saturating_duration_since(Instant::now()).as_secs())
            .unwrap_or(0)
    }

    fn ban(&mut self, connection: &str, reason: &str) {
        let until = Instant::now() + self.ban_duration;
        self.banned_until = Some(until);
        warn!("[AntiSpam] Banned connection={} for {:?}: {}", connection, self.ban_duration, reason);
    }

    /// Reset per-second counters if a new second has started.
    fn tick(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_secs(1) {
            self.last_tick = now;
            self.requests_this_tick = 0;
        }
    }
}

impl Default for AntiSpamState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_after_burst() {
        let mut state = AntiSpamState::with_limits(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(!state.record_request("c1"));
        }
        assert!(state.record_request("c1"));
        assert!(state.is_banned());
        assert!(state.ban_remaining_secs() > 0);
        // Stays banned regardless of the counter window.
        assert!(state.record_request("c1"));
    }

    #[test]
    fn test_not_banned_under_limit() {
        let mut state = AntiSpamState::new();
        assert!(!state.record_request("c1"));
        assert!(!state.is_banned());
        assert_eq!(state.ban_remaining_secs(), 0);
    }
}
