//! STUN client for public address discovery.
//!
//! One discovery sends a Binding Request and waits a bounded time for the matching
//! Binding Success Response, retrying with a fresh transaction id. Datagrams from
//! other sources or for other transactions are discarded while waiting.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use super::message::{build_binding_request, parse_binding_response, TransactionId};
use crate::config::stun::{ATTEMPTS, RECV_BUFFER_SIZE, RESPONSE_TIMEOUT_MS};
use crate::error::{StunError, StunResult};

/// STUN client for NAT traversal
#[derive(Debug, Clone)]
pub struct StunClient {
    timeout: Duration,
    attempts: u32,
}

impl Default for StunClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StunClient {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_millis(RESPONSE_TIMEOUT_MS),
            attempts: ATTEMPTS,
        }
    }

    /// Per-attempt response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests sent before giving up on one server (at least one).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Discovers the public address of a fresh ephemeral socket, used unconnected like
    /// any other discovery socket.
    pub async fn discover(&self, host: &str, port: u16) -> StunResult<SocketAddrV4> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        self.discover_on(&socket, host, port).await
    }

    /// Discovers the public address of `socket` itself, so that the mapping found is
    /// the one a peer will reach. The socket is used unconnected.
    pub async fn discover_on(&self, socket: &UdpSocket, host: &str, port: u16) -> StunResult<SocketAddrV4> {
        let server = resolve_ipv4(host, port).await?;
        self.discover_with(socket, server).await
    }

    /// Tries each server in order until one answers.
    pub async fn discover_any(&self, socket: &UdpSocket, servers: &[(String, u16)]) -> StunResult<SocketAddrV4> {
        let mut last_error = StunError::NoServers;
        for (host, port) in servers {
            match self.discover_on(socket, host, *port).await {
                Ok(addr) => return Ok(addr),
                Err(e) => {
                    warn!("[Stun] Discovery via {}:{} failed: {}", host, port, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn discover_with(&self, socket: &UdpSocket, server: SocketAddr) -> StunResult<SocketAddrV4> {
        for attempt in 1..=self.attempts {
            let transaction_id = TransactionId::random();
            let request = build_binding_request(&transaction_id);
            socket.send_to(&request, server).await?;
            debug!("[Stun] Sent binding request {} to {}", attempt, server);

            if let Some(addr) = self.await_response(socket, server, &transaction_id).await? {
                info!("[Stun] Discovery successful: {}", addr);
                return Ok(addr);
            }
            debug!("[Stun] Attempt {} to {} timed out", attempt, server);
        }
        Err(StunError::Timeout {
            server,
            attempts: self.attempts,
        })
    }

    /// Waits for the response to `transaction_id`; `Ok(None)` on timeout.
    ///
    /// A success response for this transaction that carries no usable address is a
    /// hard failure; everything else that does not match is ignored.
    async fn await_response(
        &self,
        socket: &UdpSocket,
        server: SocketAddr,
        transaction_id: &TransactionId,
    ) -> StunResult<Option<SocketAddrV4>> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            };
            if from != server {
                debug!("[Stun] Ignored {} bytes from {}", len, from);
                continue;
            }
            match parse_binding_response(&buf[..len], Some(transaction_id)) {
                Ok(addr) => return Ok(Some(addr)),
                Err(StunError::TransactionMismatch) => {
                    debug!("[Stun] Discarded response for another transaction");
                }
                Err(StunError::UnexpectedMessageType(t)) => {
                    debug!("[Stun] Discarded message type 0x{:04x}", t);
                }
                Err(StunError::TooShort(n)) => debug!("[Stun] Discarded {}-byte datagram", n),
                Err(e) => return Err(e),
            }
        }
    }
}

/// First IPv4 address of `host:port`.
async fn resolve_ipv4(host: &str, port: u16) -> StunResult<SocketAddr> {
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| StunError::Resolve {
        host: host.to_string(),
        reason: e.to_string(),
    })?;
    addrs
        .into_iter()
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| StunError::NoIpv4Address(host.to_string()))
}
