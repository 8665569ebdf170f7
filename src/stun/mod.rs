//! STUN subset: Binding Request out, Binding Success Response in, IPv4 mapped
//! address recovered. Not a STUN/TURN/ICE stack.

pub mod client;
pub mod message;

pub use client::StunClient;
pub use message::{parse_binding_response, TransactionId};
