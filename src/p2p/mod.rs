//! Direct peer-to-peer UDP channel between two matched players.

pub mod envelope;
pub mod session;

pub use envelope::P2PEnvelope;
pub use session::{ConnectivityReport, P2PSession, SessionEvent};
