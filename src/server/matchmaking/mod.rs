/// Matchmaking module: queue, match registry, readiness gate and relay.

pub mod server;
pub mod session;
pub mod messages;
pub mod queue;
pub mod types;
