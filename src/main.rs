//! Main entry point for the signaling server.
//!
//! Initializes the actor system, starts the rendezvous actor, and launches the HTTP server
//! with the matchmaking websocket endpoint.

use actix::Actor;
use actix_web::{web, App, HttpServer};
use log::info;

use rendezvous::config::server::{bind_address, SIGNALING_PATH};
use rendezvous::server::matchmaking::server::RendezvousServer;
use rendezvous::server::{router, state::AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger from environment variable (default to info level).
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Start the RendezvousServer actor (queue, match registry, readiness gate).
    let rendezvous_addr = RendezvousServer::new().start();

    // Shared application state for HTTP/WebSocket handlers.
    let state = web::Data::new(AppState::new(rendezvous_addr));

    let (host, port) = bind_address();
    info!("[Rendezvous] Listening on ws://{}:{}{}", host, port, SIGNALING_PATH);

    HttpServer::new(move || {
        App::new()
            .wrap(
                actix_web::middleware::DefaultHeaders::new()
                    .add(("Access-Control-Allow-Origin", "*"))
                    .add(("Access-Control-Allow-Headers", "*"))
            )
            .app_data(state.clone())
            .configure(router::config)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
