//! HTTP and WebSocket routing configuration.
//!
//! Defines the signaling endpoint, handled by a dedicated WebSocket actor per connection.

use actix_web::web;
use crate::config::server::SIGNALING_PATH;
use crate::server::matchmaking::session::ws_matchmaking;

/// Configure the application's WebSocket routes.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(SIGNALING_PATH)
            .to(ws_matchmaking)
    );
}
