//! Minimal peer: joins the queue, prints what happens, and sends each stdin line as chat.
//!
//! Usage: `peer [SERVER_URL] [PLAYER_NAME]`. `PEER_PORT` fixes the local UDP port and
//! `PEER_FALLBACK` (`disabled`, `loopback`, `synthetic`) picks what to report when STUN fails.

use std::env;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use rendezvous::client::{PeerClient, PeerEvent};
use rendezvous::config::peer::{AddressFallback, PeerConfig};
use rendezvous::error::ClientError;

fn config_from_env() -> PeerConfig {
    let mut config = PeerConfig::default();
    let mut args = env::args().skip(1);
    if let Some(url) = args.next() {
        config.server_url = url;
    }
    if let Some(name) = args.next() {
        config.player_name = name;
    }
    if let Some(port) = env::var("PEER_PORT").ok().and_then(|p| p.parse().ok()) {
        config.local_port = port;
    }
    if let Ok(value) = env::var("PEER_FALLBACK") {
        match AddressFallback::parse(&value) {
            Some(fallback) => config.fallback = fallback,
            None => warn!("[Peer] Unknown PEER_FALLBACK '{}', keeping {:?}", value, config.fallback),
        }
    }
    config
}

fn print_event(event: &PeerEvent) {
    match event {
        PeerEvent::Queued { position } => println!("In queue (position {})", position),
        PeerEvent::MatchFound { opponent, role, .. } => {
            println!("Match found against {} as {:?}", opponent.player_name, role)
        }
        PeerEvent::AddressDiscovered { info, source, .. } => {
            println!("Public address {}:{} ({:?})", info.ip, info.port, source)
        }
        PeerEvent::DiscoveryFailed { reason, .. } => println!("Address discovery failed: {}", reason),
        PeerEvent::P2PReady { opponent, .. } => {
            println!("Connected to {} at {}:{}", opponent.player_name, opponent.ip, opponent.port)
        }
        PeerEvent::ChatReceived {
            sender,
            message,
            transport,
        } => println!("[{:?}] {}: {}", transport, sender, message),
        PeerEvent::ConnectivityChecked(report) => println!(
            "Connectivity: {}/{} pongs from {}",
            report.pongs_received, report.pings_sent, report.remote
        ),
        PeerEvent::OpponentDisconnected => println!("Opponent disconnected"),
        PeerEvent::ServerError { code, message } => println!("Server error {}: {}", code, message),
        PeerEvent::Disconnected => println!("Disconnected from server"),
    }
}

#[actix_web::main]
async fn main() -> Result<(), ClientError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config_from_env();
    info!("[Peer] {} ({}) connecting to {}", config.player_name, config.player_id, config.server_url);
    let (client, mut events) = PeerClient::connect(config).await?;
    client.find_match()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    print_event(&event);
                    if event == PeerEvent::Disconnected {
                        break;
                    }
                }
                None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    if let Err(e) = client.send_chat(line.trim()).await {
                        warn!("[Peer] Message not sent: {}", e);
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    error!("[Peer] stdin error: {}", e);
                    break;
                }
            },
        }
    }
    Ok(())
}
