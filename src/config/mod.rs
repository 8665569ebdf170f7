/// Main configuration module.
/// 
/// Re-exports submodules for the signaling server, matchmaking, flood protection,
/// STUN discovery and the peer-to-peer UDP session.
pub mod server;
pub mod matchmaking;
pub mod anti_spam;
pub mod stun;
pub mod p2p;
pub mod peer;
