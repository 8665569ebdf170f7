//! Rendezvous service for 1v1 peer sessions.
//!
//! The signaling server ([`server`]) queues players, pairs them two by two, collects the
//! address each one discovered for itself and, once both are known, tells each player
//! where to find the other. Players ([`client`]) discover their public address with a
//! small STUN client ([`stun`]) and then talk directly over UDP ([`p2p`]), with the
//! signaling server as a chat relay fallback.

pub mod client;
pub mod config;
pub mod error;
pub mod p2p;
pub mod protocol;
pub mod server;
pub mod stun;

#[cfg(test)]
mod tests;
