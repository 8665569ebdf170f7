/// Peer client configuration.
///
/// Unlike the other config modules this one is a value: each `PeerClient` carries
/// its own identity, UDP port and discovery settings.
use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use super::p2p::LOCAL_PORT_RANGE;
use super::server::{DEFAULT_HOST, DEFAULT_PORT, SIGNALING_PATH};
use super::stun::{ATTEMPTS, DEFAULT_STUN_SERVERS, RESPONSE_TIMEOUT_MS};

/// What to report when STUN discovery fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressFallback {
    /// Report nothing; the failure surfaces as a `DiscoveryFailed` event.
    #[default]
    Disabled,
    /// Report `127.0.0.1:<bound port>`. For two peers on one host.
    Loopback,
    /// Report a random `192.168.1.x` address. Test mode only, never reachable.
    Synthetic,
}

impl AddressFallback {
    /// Parses `disabled`, `loopback` or `synthetic` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "disabled" | "off" => Some(Self::Disabled),
            "loopback" => Some(Self::Loopback),
            "synthetic" => Some(Self::Synthetic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Websocket URL of the signaling endpoint.
    pub server_url: String,
    pub player_id: String,
    pub player_name: String,
    /// UDP port used for STUN discovery and the P2P session.
    pub local_port: u16,
    /// Tried in order until one answers.
    pub stun_servers: Vec<(String, u16)>,
    pub stun_timeout: Duration,
    pub stun_attempts: u32,
    pub fallback: AddressFallback,
    /// Run the ping/pong connectivity test after `startP2P`.
    pub self_test: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        let mut rng = rand::rng();
        Self {
            server_url: format!("ws://{}:{}{}", DEFAULT_HOST, DEFAULT_PORT, SIGNALING_PATH),
            player_id: Uuid::new_v4().to_string(),
            player_name: format!("Player_{}", rng.random_range(1000..10000)),
            local_port: rng.random_range(LOCAL_PORT_RANGE),
            stun_servers: DEFAULT_STUN_SERVERS
                .iter()
                .map(|(host, port)| (host.to_string(), *port))
                .collect(),
            stun_timeout: Duration::from_millis(RESPONSE_TIMEOUT_MS),
            stun_attempts: ATTEMPTS,
            fallback: AddressFallback::default(),
            self_test: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_peer_config() {
        let config = PeerConfig::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:3000/ws/matchmaking");
        assert!(LOCAL_PORT_RANGE.contains(&config.local_port));
        assert!(config.player_name.starts_with("Player_"));
        assert_eq!(config.player_name.len(), "Player_".len() + 4);
        assert!(Uuid::parse_str(&config.player_id).is_ok());
        assert_eq!(config.stun_servers.len(), 5);
        assert_eq!(config.fallback, AddressFallback::Disabled);
    }

    #[test]
    fn test_two_defaults_have_distinct_ids() {
        assert_ne!(PeerConfig::default().player_id, PeerConfig::default().player_id);
    }

    #[test]
    fn test_fallback_parse() {
        assert_eq!(AddressFallback::parse("Loopback"), Some(AddressFallback::Loopback));
        assert_eq!(AddressFallback::parse("synthetic"), Some(AddressFallback::Synthetic));
        assert_eq!(AddressFallback::parse("off"), Some(AddressFallback::Disabled));
        assert_eq!(AddressFallback::parse("nat"), None);
    }
}
