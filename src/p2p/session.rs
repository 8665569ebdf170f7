//! Direct UDP session with one remote peer.
//!
//! The session owns a UDP socket and an independent receive loop. It talks to a
//! single configured remote at a time, but answers pings from whoever sent them.
//! Nothing is retransmitted or acknowledged: every envelope is one best-effort datagram.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::envelope::P2PEnvelope;
use crate::config::p2p::{
    MAX_DATAGRAM_SIZE, SELF_TEST_GRACE_MS, SELF_TEST_PINGS, SELF_TEST_PING_INTERVAL_MS,
};
use crate::error::{P2PError, P2PResult};

/// Events surfaced by the receive loop to the session owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ChatReceived {
        sender: String,
        message: String,
        from: SocketAddr,
    },
}

/// Outcome of the connectivity self-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityReport {
    pub remote: SocketAddr,
    pub pings_sent: u32,
    pub pongs_received: u64,
}

impl ConnectivityReport {
    pub fn is_reachable(&self) -> bool {
        self.pongs_received > 0
    }
}

pub struct P2PSession {
    player_name: String,
    socket: Arc<UdpSocket>,
    remote: Arc<RwLock<Option<SocketAddr>>>,
    pongs: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl P2PSession {
    /// Binds `0.0.0.0:local_port` and starts the receive loop.
    pub async fn start(
        player_name: &str,
        local_port: u16,
    ) -> P2PResult<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local_port))
            .await
            .map_err(|source| P2PError::Bind { port: local_port, source })?;
        Ok(Self::from_socket(player_name, socket))
    }

    /// Starts the receive loop on an already bound socket (e.g. one STUN ran on).
    /// Must be called from within a tokio runtime.
    pub fn from_socket(player_name: &str, socket: UdpSocket) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let socket = Arc::new(socket);
        let pongs = Arc::new(AtomicU64::new(0));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let recv_task = tokio::spawn(receive_loop(
            player_name.to_string(),
            socket.clone(),
            pongs.clone(),
            events_tx,
            shutdown_rx,
        ));
        if let Ok(addr) = socket.local_addr() {
            info!("[P2P] Session for {} started on {}", player_name, addr);
        }

        let session = Self {
            player_name: player_name.to_string(),
            socket,
            remote: Arc::new(RwLock::new(None)),
            pongs,
            shutdown,
            recv_task: Mutex::new(Some(recv_task)),
        };
        (session, events_rx)
    }

    pub fn local_addr(&self) -> P2PResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Fixes the single peer this session sends to.
    pub fn set_remote(&self, ip: Ipv4Addr, port: u16) {
        let addr = SocketAddr::V4(SocketAddrV4::new(ip, port));
        if let Ok(mut remote) = self.remote.write() {
            *remote = Some(addr);
        }
        info!("[P2P] Remote endpoint set to {}", addr);
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote.read().ok().and_then(|remote| *remote)
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    pub async fn send_chat(&self, text: &str) -> P2PResult<()> {
        self.send_to_remote(&P2PEnvelope::chat(&self.player_name, text)).await?;
        debug!("[P2P] Chat sent: {}", text);
        Ok(())
    }

    pub async fn send_ping(&self) -> P2PResult<()> {
        self.send_to_remote(&P2PEnvelope::ping(&self.player_name)).await
    }

    async fn send_to_remote(&self, envelope: &P2PEnvelope) -> P2PResult<()> {
        if !self.is_running() {
            return Err(P2PError::Stopped);
        }
        let remote = self.remote().ok_or(P2PError::NoRemote)?;
        let data = envelope.encode()?;
        self.socket.send_to(&data, remote).await?;
        Ok(())
    }

    /// Pings the remote a few times, then sends a test chat, and reports how many
    /// pongs came back. Warms up NAT bindings on both sides as a side effect.
    pub async fn test_connectivity(&self) -> P2PResult<ConnectivityReport> {
        self.test_connectivity_with(
            SELF_TEST_PINGS,
            Duration::from_millis(SELF_TEST_PING_INTERVAL_MS),
            Duration::from_millis(SELF_TEST_GRACE_MS),
        )
        .await
    }

    pub async fn test_connectivity_with(
        &self,
        pings: u32,
        interval: Duration,
        grace: Duration,
    ) -> P2PResult<ConnectivityReport> {
        let remote = self.remote().ok_or(P2PError::NoRemote)?;
        let before = self.pongs.load(Ordering::SeqCst);
        let mut shutdown = self.shutdown.subscribe();
        info!("[P2P] Testing connection to {}", remote);

        let mut pings_sent = 0;
        for _ in 0..pings {
            self.send_ping().await?;
            pings_sent += 1;
            if sleep_unless_stopped(&mut shutdown, interval).await {
                return Err(P2PError::Stopped);
            }
        }
        self.send_chat(&format!("[TEST] P2P connection test from {}", self.player_name))
            .await?;
        if sleep_unless_stopped(&mut shutdown, grace).await {
            return Err(P2PError::Stopped);
        }

        let report = ConnectivityReport {
            remote,
            pings_sent,
            pongs_received: self.pongs.load(Ordering::SeqCst) - before,
        };
        if report.is_reachable() {
            info!("[P2P] {} reachable: {}/{} pongs", remote, report.pongs_received, pings_sent);
        } else {
            warn!("[P2P] No pong from {} after {} pings", remote, pings_sent);
        }
        Ok(report)
    }

    /// Stops the receive loop and waits for it to exit. Safe while a receive is pending.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let task = self.recv_task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("[P2P] Receive loop ended abnormally: {}", e);
            }
            info!("[P2P] Session for {} stopped", self.player_name);
        }
    }
}

impl Drop for P2PSession {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Sleeps for `duration`; returns true if the session stopped first.
async fn sleep_unless_stopped(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.wait_for(|stopped| *stopped) => true,
    }
}

async fn receive_loop(
    player_name: String,
    socket: Arc<UdpSocket>,
    pongs: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        if *shutdown.borrow() {
            break;
        }
        let (len, from) = tokio::select! {
            _ = shutdown.changed() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(e) => {
                    warn!("[P2P] Error receiving UDP message: {}", e);
                    continue;
                }
            },
        };

        let envelope = match P2PEnvelope::decode(&buf[..len]) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("[P2P] Dropped malformed datagram from {}: {}", from, e);
                continue;
            }
        };

        match envelope {
            P2PEnvelope::Chat { sender, message, .. } => {
                info!("[P2P] From {}: {}: {}", from, sender, message);
                let _ = events.send(SessionEvent::ChatReceived { sender, message, from });
            }
            P2PEnvelope::Ping { sender, .. } => {
                debug!("[P2P] Ping from {} ({})", sender, from);
                match P2PEnvelope::pong(&player_name).encode() {
                    Ok(data) => {
                        if let Err(e) = socket.send_to(&data, from).await {
                            warn!("[P2P] Failed to send pong to {}: {}", from, e);
                        }
                    }
                    Err(e) => warn!("[P2P] Failed to encode pong: {}", e),
                }
            }
            P2PEnvelope::Pong { sender, .. } => {
                debug!("[P2P] Pong from {} ({})", sender, from);
                pongs.fetch_add(1, Ordering::SeqCst);
            }
            P2PEnvelope::Unknown => {
                warn!("[P2P] Unknown message type from {}", from);
            }
        }
    }
    debug!("[P2P] Receive loop for {} exited", player_name);
}
