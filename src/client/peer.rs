//! Consumer-side orchestrator for one player.
//!
//! A `PeerClient` is fed from two places at once: signaling events (through [`PeerClient::run`]
//! or [`PeerClient::handle_server_message`]) and the receive loop of its UDP session.
//! The match state both of them touch sits behind a single lock, so the chat path
//! always reads a consistent opponent/session pair.
//!
//! Lifecycle: `find_match` → `matchFound` → `requestConnectionInfo` (STUN on the UDP port
//! the session will use) → `connectionInfo` → `startP2P` → chat.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::signaling;
use crate::config::p2p::{SELF_TEST_DELAY_MS, SYNTHETIC_HOST_RANGE, SYNTHETIC_PORT_RANGE, SYNTHETIC_PREFIX};
use crate::config::peer::{AddressFallback, PeerConfig};
use crate::error::{ClientError, P2PError};
use crate::p2p::{ConnectivityReport, P2PSession, SessionEvent};
use crate::protocol::{
    ClientMessage, ConnectionInfo, FindMatchRequest, OpponentInfo, PeerInfo, RelayRequest, Role, ServerMessage,
};
use crate::stun::StunClient;

/// Path a received chat took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTransport {
    Direct,
    Relay,
}

/// Origin of a reported address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    Stun,
    Fallback,
}

/// Events delivered to whoever drives the client (a UI, a test, the `peer` binary).
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Queued {
        position: usize,
    },
    MatchFound {
        match_id: String,
        opponent: OpponentInfo,
        role: Role,
    },
    AddressDiscovered {
        match_id: String,
        info: ConnectionInfo,
        source: AddressSource,
    },
    DiscoveryFailed {
        match_id: String,
        reason: String,
    },
    P2PReady {
        match_id: String,
        opponent: PeerInfo,
        own: PeerInfo,
    },
    ChatReceived {
        sender: String,
        message: String,
        transport: ChatTransport,
    },
    ConnectivityChecked(ConnectivityReport),
    OpponentDisconnected,
    ServerError {
        code: String,
        message: String,
    },
    Disconnected,
}

/// Which transports accepted one `send_chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatDelivery {
    pub direct: bool,
    pub relayed: bool,
}

#[derive(Default)]
struct MatchContext {
    match_id: Option<String>,
    opponent: Option<OpponentInfo>,
    remote: Option<SocketAddrV4>,
    // Set once per match; aborted when the match ends so its socket frees the port.
    discovery: Option<JoinHandle<()>>,
    // Socket STUN ran on, parked until `startP2P` hands it to the session.
    socket: Option<UdpSocket>,
    session: Option<Arc<P2PSession>>,
}

pub struct PeerClient {
    config: PeerConfig,
    stun: StunClient,
    signaling: mpsc::UnboundedSender<ClientMessage>,
    events: mpsc::UnboundedSender<PeerEvent>,
    state: Mutex<MatchContext>,
}

impl PeerClient {
    /// Builds a client that writes signaling messages to `signaling`.
    ///
    /// Nothing is read until [`run`](Self::run) is driven or messages are passed to
    /// [`handle_server_message`](Self::handle_server_message).
    pub fn new(
        config: PeerConfig,
        signaling: mpsc::UnboundedSender<ClientMessage>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let stun = StunClient::new()
            .with_timeout(config.stun_timeout)
            .with_attempts(config.stun_attempts);
        let client = Arc::new(Self {
            config,
            stun,
            signaling,
            events,
            state: Mutex::new(MatchContext::default()),
        });
        (client, events_rx)
    }

    /// Opens the signaling websocket and starts processing its events.
    ///
    /// Must be called from within an actix system (the websocket pump is a local task).
    pub async fn connect(config: PeerConfig) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<PeerEvent>), ClientError> {
        let (outgoing, incoming) = signaling::connect(&config.server_url).await?;
        let (client, events) = Self::new(config, outgoing);
        tokio::spawn(client.clone().run(incoming));
        Ok((client, events))
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn find_match(&self) -> Result<(), ClientError> {
        info!("[Peer] {} looking for a match", self.config.player_name);
        self.send_signal(ClientMessage::FindMatch(FindMatchRequest {
            player_id: Some(self.config.player_id.clone()),
            player_name: Some(self.config.player_name.clone()),
        }))
    }

    pub fn leave_queue(&self) -> Result<(), ClientError> {
        self.send_signal(ClientMessage::LeaveQueue)
    }

    pub fn match_id(&self) -> Option<String> {
        self.lock().match_id.clone()
    }

    pub fn opponent(&self) -> Option<OpponentInfo> {
        self.lock().opponent.clone()
    }

    /// Opponent endpoint from `startP2P`, once the session runs.
    pub fn remote(&self) -> Option<SocketAddrV4> {
        self.lock().remote
    }

    /// True between `startP2P` and the end of the match.
    pub fn is_in_match(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Sends `text` directly over UDP and through the signaling relay.
    ///
    /// Succeeds if either transport accepted the message, so the opponent may see it twice.
    pub async fn send_chat(&self, text: &str) -> Result<ChatDelivery, ClientError> {
        let (session, opponent_id) = {
            let state = self.lock();
            match (&state.session, &state.opponent) {
                (Some(session), Some(opponent)) => (session.clone(), opponent.player_id.clone()),
                _ => return Err(ClientError::NotInMatch),
            }
        };

        let direct = session.send_chat(text).await;
        if let Err(e) = &direct {
            warn!("[Peer] Direct send failed: {}", e);
        }
        let relayed = self.send_signal(ClientMessage::P2pMessage(RelayRequest {
            target_player_id: opponent_id,
            message: text.to_string(),
            sender_name: self.config.player_name.clone(),
        }));

        match (direct, relayed) {
            (Err(e), Err(_)) => Err(e.into()),
            (direct, relayed) => Ok(ChatDelivery {
                direct: direct.is_ok(),
                relayed: relayed.is_ok(),
            }),
        }
    }

    /// Processes signaling events until the channel closes, then tears the match down.
    pub async fn run(self: Arc<Self>, mut incoming: mpsc::UnboundedReceiver<ServerMessage>) {
        while let Some(msg) = incoming.recv().await {
            self.handle_server_message(msg).await;
        }
        info!("[Peer] Signaling channel closed");
        self.end_match().await;
        self.emit(PeerEvent::Disconnected);
    }

    pub async fn handle_server_message(self: &Arc<Self>, msg: ServerMessage) {
        debug!("[Peer] Received {}", msg.event_name());
        match msg {
            ServerMessage::QueueStatus { position, message } => {
                info!("[Peer] {} (position {})", message, position);
                self.emit(PeerEvent::Queued { position });
            }
            ServerMessage::MatchFound {
                match_id,
                opponent,
                your_role,
                ..
            } => {
                info!("[Peer] Match {} found against {}", match_id, opponent.player_name);
                self.replace_match(MatchContext {
                    match_id: Some(match_id.clone()),
                    opponent: Some(opponent.clone()),
                    ..MatchContext::default()
                })
                .await;
                self.emit(PeerEvent::MatchFound {
                    match_id,
                    opponent,
                    role: your_role,
                });
            }
            ServerMessage::RequestConnectionInfo => self.start_discovery(),
            ServerMessage::StartP2P {
                match_id,
                opponent,
                your_info,
                ..
            } => self.start_p2p(match_id, opponent, your_info).await,
            ServerMessage::P2pMessage {
                sender_name, message, ..
            } => {
                info!("[Peer] {} (relay): {}", sender_name, message);
                self.emit(PeerEvent::ChatReceived {
                    sender: sender_name,
                    message,
                    transport: ChatTransport::Relay,
                });
            }
            ServerMessage::OpponentDisconnected { message } => {
                info!("[Peer] {}", message);
                self.end_match().await;
                self.emit(PeerEvent::OpponentDisconnected);
            }
            ServerMessage::Error { code, message } => {
                warn!("[Peer] Server error {}: {}", code, message);
                self.emit(PeerEvent::ServerError { code, message });
            }
        }
    }

    /// Spawns address discovery once per match.
    fn start_discovery(self: &Arc<Self>) {
        let mut state = self.lock();
        let Some(match_id) = state.match_id.clone() else {
            warn!("[Peer] requestConnectionInfo outside a match ignored");
            return;
        };
        if state.discovery.is_some() {
            debug!("[Peer] Discovery already started for {}", match_id);
            return;
        }
        state.discovery = Some(tokio::spawn(self.clone().discover_and_report(match_id)));
    }

    async fn discover_and_report(self: Arc<Self>, match_id: String) {
        let port = self.config.local_port;
        let socket = match UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(socket) => socket,
            Err(source) => {
                let e = P2PError::Bind { port, source };
                error!("[Peer] {}", e);
                self.emit(PeerEvent::DiscoveryFailed {
                    match_id,
                    reason: e.to_string(),
                });
                return;
            }
        };
        let bound_port = socket.local_addr().map(|addr| addr.port()).unwrap_or(port);

        let (info, source) = match self.stun.discover_any(&socket, &self.config.stun_servers).await {
            Ok(addr) => (ConnectionInfo::from(addr), AddressSource::Stun),
            Err(e) => {
                warn!("[Peer] STUN discovery failed: {}", e);
                self.emit(PeerEvent::DiscoveryFailed {
                    match_id: match_id.clone(),
                    reason: e.to_string(),
                });
                match fallback_address(self.config.fallback, bound_port) {
                    Some(info) => (info, AddressSource::Fallback),
                    None => return,
                }
            }
        };

        {
            let mut state = self.lock();
            if state.match_id.as_deref() != Some(match_id.as_str()) {
                debug!("[Peer] Match {} ended during discovery", match_id);
                return;
            }
            state.socket = Some(socket);
        }

        info!("[Peer] Reporting {}:{} ({:?})", info.ip, info.port, source);
        self.emit(PeerEvent::AddressDiscovered { match_id, info, source });
        if let Err(e) = self.send_signal(ClientMessage::ConnectionInfo(info)) {
            warn!("[Peer] Could not report connection info: {}", e);
        }
    }

    async fn start_p2p(self: &Arc<Self>, match_id: String, opponent: PeerInfo, own: PeerInfo) {
        let socket = {
            let mut state = self.lock();
            if state.match_id.as_deref() != Some(match_id.as_str()) {
                warn!("[Peer] startP2P for unknown match {} ignored", match_id);
                return;
            }
            if state.session.is_some() {
                debug!("[Peer] Session for {} already running", match_id);
                return;
            }
            state.socket.take()
        };

        let name = &self.config.player_name;
        let started = match socket {
            Some(socket) => Ok(P2PSession::from_socket(name, socket)),
            None => P2PSession::start(name, self.config.local_port).await,
        };
        let (session, session_events) = match started {
            Ok(started) => started,
            Err(e) => {
                error!("[Peer] Could not start P2P session: {}", e);
                return;
            }
        };
        session.set_remote(opponent.ip, opponent.port);
        let session = Arc::new(session);

        {
            let mut state = self.lock();
            if state.match_id.as_deref() != Some(match_id.as_str()) {
                debug!("[Peer] Match {} ended while the session started", match_id);
                return;
            }
            state.remote = Some(opponent.endpoint());
            state.session = Some(session.clone());
        }

        tokio::spawn(forward_session_events(self.events.clone(), session_events));
        info!(
            "[Peer] P2P ready with {} at {}",
            opponent.player_name,
            opponent.endpoint()
        );
        self.emit(PeerEvent::P2PReady {
            match_id,
            opponent,
            own,
        });
        if self.config.self_test {
            tokio::spawn(run_self_test(self.events.clone(), Arc::downgrade(&session)));
        }
    }

    /// Forgets the current match and stops its session, if any.
    async fn end_match(&self) {
        self.replace_match(MatchContext::default()).await;
    }

    /// Installs `next` and tears down whatever the previous match left running.
    ///
    /// Returns once the previous discovery task is gone and its session stopped, so the
    /// local UDP port is free for the next bind.
    async fn replace_match(&self, next: MatchContext) {
        let previous = std::mem::replace(&mut *self.lock(), next);
        if let Some(discovery) = previous.discovery {
            discovery.abort();
            if let Err(e) = discovery.await {
                if !e.is_cancelled() {
                    warn!("[Peer] Discovery task failed: {}", e);
                }
            }
        }
        if let Some(session) = previous.session {
            session.stop().await;
        }
    }

    fn send_signal(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.signaling.send(msg).map_err(|_| ClientError::SignalingClosed)
    }

    fn emit(&self, event: PeerEvent) {
        if self.events.send(event).is_err() {
            debug!("[Peer] No listener for peer events");
        }
    }

    fn lock(&self) -> MutexGuard<'_, MatchContext> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn forward_session_events(
    events: mpsc::UnboundedSender<PeerEvent>,
    mut session_events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(SessionEvent::ChatReceived { sender, message, from }) = session_events.recv().await {
        info!("[Peer] {} (direct from {}): {}", sender, from, message);
        let event = PeerEvent::ChatReceived {
            sender,
            message,
            transport: ChatTransport::Direct,
        };
        if events.send(event).is_err() {
            break;
        }
    }
}

/// Waits for the opponent to bind, then pings it. Gives up if the session went away.
async fn run_self_test(events: mpsc::UnboundedSender<PeerEvent>, session: std::sync::Weak<P2PSession>) {
    tokio::time::sleep(Duration::from_millis(SELF_TEST_DELAY_MS)).await;
    let Some(session) = session.upgrade().filter(|session| session.is_running()) else {
        return;
    };
    match session.test_connectivity().await {
        Ok(report) => {
            let _ = events.send(PeerEvent::ConnectivityChecked(report));
        }
        Err(e) => debug!("[Peer] Connectivity test aborted: {}", e),
    }
}

fn fallback_address(policy: AddressFallback, bound_port: u16) -> Option<ConnectionInfo> {
    match policy {
        AddressFallback::Disabled => None,
        AddressFallback::Loopback => Some(ConnectionInfo {
            ip: Ipv4Addr::LOCALHOST,
            port: bound_port,
        }),
        AddressFallback::Synthetic => {
            let mut rng = rand::rng();
            let [a, b, c] = SYNTHETIC_PREFIX;
            Some(ConnectionInfo {
                ip: Ipv4Addr::new(a, b, c, rng.random_range(SYNTHETIC_HOST_RANGE)),
                port: rng.random_range(SYNTHETIC_PORT_RANGE),
            })
        }
    }
}
