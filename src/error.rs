//! Error types for STUN discovery, the UDP peer session and the peer client.

use std::net::SocketAddr;

use thiserror::Error;

/// STUN discovery failures. Every variant means "no address discovered";
/// the caller decides on any fallback.
#[derive(Debug, Error)]
pub enum StunError {
    /// IO error on the discovery socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Host name lookup failed
    #[error("Failed to resolve STUN server '{host}': {reason}")]
    Resolve { host: String, reason: String },

    /// Lookup succeeded but produced no IPv4 address
    #[error("No IPv4 address for STUN server '{0}'")]
    NoIpv4Address(String),

    /// No matching response within the retry budget
    #[error("STUN request to {server} timed out after {attempts} attempt(s)")]
    Timeout { server: SocketAddr, attempts: u32 },

    /// Message shorter than the 20-byte header
    #[error("STUN message too short: {0} bytes")]
    TooShort(usize),

    /// Anything other than a Binding Success Response
    #[error("Unexpected STUN message type: 0x{0:04x}")]
    UnexpectedMessageType(u16),

    /// Response belongs to another request
    #[error("STUN transaction id mismatch")]
    TransactionMismatch,

    /// Success response without a usable IPv4 mapped address
    #[error("No mapped address in STUN response")]
    NoMappedAddress,

    /// Every configured server failed
    #[error("No STUN server configured")]
    NoServers,
}

/// UDP peer session errors.
#[derive(Debug, Error)]
pub enum P2PError {
    /// Could not bind the local UDP port
    #[error("Bind error on port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Send attempted before `set_remote`
    #[error("Remote endpoint not set")]
    NoRemote,

    /// Envelope could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session already stopped
    #[error("Session stopped")]
    Stopped,
}

/// Peer client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not open the signaling websocket
    #[error("Signaling connect error: {0}")]
    Connect(String),

    /// The signaling channel is gone
    #[error("Signaling channel closed")]
    SignalingClosed,

    /// Chat attempted outside a ready match
    #[error("Not in a match")]
    NotInMatch,

    /// UDP session error
    #[error("P2P error: {0}")]
    P2P(#[from] P2PError),
}

/// Result type for STUN operations
pub type StunResult<T> = Result<T, StunError>;

/// Result type for P2P session operations
pub type P2PResult<T> = Result<T, P2PError>;
