/// Signaling server bind configuration, read from the environment.
use std::env;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Websocket path of the signaling channel.
pub const SIGNALING_PATH: &str = "/ws/matchmaking";

/// Host and port to bind, from `HOST` and `PORT` when set.
///
/// An unparsable `PORT` falls back to the default instead of aborting startup.
pub fn bind_address() -> (String, u16) {
    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    (host, port)
}
