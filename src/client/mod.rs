//! Peer side of the system: the signaling connector and the per-player orchestrator.
pub mod peer;
pub mod signaling;

pub use peer::{AddressSource, ChatDelivery, ChatTransport, PeerClient, PeerEvent};
