// src/server/state.rs

//! Application state for the signaling server.
//!
//! Holds the address of the rendezvous actor so WebSocket handlers can reach it.

use actix::Addr;
use crate::server::matchmaking::server::RendezvousServer;

/// Shared application state, injected into WebSocket handlers.
pub struct AppState {
    /// Address of the rendezvous server actor (queue, matches, relay).
    pub rendezvous_addr: Addr<RendezvousServer>,
}

impl AppState {
    /// Create a new AppState with the given actor address.
    pub fn new(rendezvous_addr: Addr<RendezvousServer>) -> Self {
        AppState { rendezvous_addr }
    }
}
