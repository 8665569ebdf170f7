// src/server/mod.rs

//! Server layer root module.
//!
//! This module organizes the signaling server components, including:
//! - Application state management
//! - WebSocket routing
//! - Matchmaking logic (queue, match registry, readiness gate, relay chat)
//! - Error events and flood protection for the signaling channel

pub mod state;
pub mod router;
pub mod matchmaking;
pub mod ws_error;
pub mod anti_spam;
