//! WebSocket session handler for the signaling channel.
//!
//! This actor manages a single player's connection to the rendezvous server. It decodes
//! each text frame into a typed [`ClientMessage`] once, forwards it to the server actor,
//! and serializes server events back to the client. Malformed frames are answered with
//! an `error` event and dropped; the connection stays open.
use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, warn};
use std::time::{Duration, Instant};

use super::messages::{Connect, Disconnect, FindMatch, LeaveQueue, RelayChat, ReportConnectionInfo};
use super::server::RendezvousServer;
use super::types::ConnectionId;
use crate::config::matchmaking::{CLIENT_TIMEOUT_SECS, HEARTBEAT_INTERVAL_SECS};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::server::anti_spam::AntiSpamState;
use crate::server::ws_error::{ws_error_text, ErrorCode};

/// Represents a player's WebSocket session on the signaling channel.
pub struct RendezvousSession {
    pub connection: ConnectionId,
    pub server_addr: Addr<RendezvousServer>,
    last_heartbeat: Instant,
    anti_spam: AntiSpamState,
}

impl RendezvousSession {
    pub fn new(server_addr: Addr<RendezvousServer>) -> Self {
        Self {
            connection: ConnectionId::new(),
            server_addr,
            last_heartbeat: Instant::now(),
            anti_spam: AntiSpamState::new(),
        }
    }

    /// Pings the client periodically and drops it once it stays silent too long.
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS), |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > Duration::from_secs(CLIENT_TIMEOUT_SECS) {
                warn!("[Session] {} heartbeat timed out", act.connection);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Forwards one decoded client message to the server actor.
    fn dispatch(&self, msg: ClientMessage) {
        let connection = self.connection;
        match msg {
            ClientMessage::FindMatch(request) => {
                self.server_addr.do_send(FindMatch { connection, request });
            }
            ClientMessage::ConnectionInfo(info) => {
                self.server_addr.do_send(ReportConnectionInfo { connection, info });
            }
            ClientMessage::P2pMessage(request) => {
                self.server_addr.do_send(RelayChat { connection, request });
            }
            ClientMessage::LeaveQueue => {
                self.server_addr.do_send(LeaveQueue { connection });
            }
        }
    }

    /// Sends the rate-limit error, closes and stops the actor.
    fn send_ban_and_close(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.text(ws_error_text(ErrorCode::RateLimited));
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Policy,
            description: Some(format!(
                "Rate limited for {}s",
                self.anti_spam.ban_remaining_secs()
            )),
        }));
        ctx.stop();
    }
}

impl Actor for RendezvousSession {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the session starts. Registers the connection with the server.
    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);
        self.server_addr.do_send(Connect {
            connection: self.connection,
            addr: ctx.address().recipient(),
        });
    }

    /// Called when the session stops. Removes the connection from queue and match.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.server_addr.do_send(Disconnect {
            connection: self.connection,
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RendezvousSession {
    /// Handles incoming WebSocket messages from the client.
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("[Session] {} protocol error: {}", self.connection, e);
                ctx.stop();
                return;
            }
        };
        self.last_heartbeat = Instant::now();
        match msg {
            ws::Message::Text(text) => {
                if self.anti_spam.record_request(&self.connection.to_string()) {
                    self.send_ban_and_close(ctx);
                    return;
                }
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => self.dispatch(client_msg),
                    Err(e) => {
                        debug!("[Session] {} sent invalid message: {}", self.connection, e);
                        ctx.text(ws_error_text(rejection_code(&text)));
                    }
                }
            }
            ws::Message::Binary(_) => ctx.text(ws_error_text(ErrorCode::InvalidMessage)),
            ws::Message::Ping(msg) => ctx.pong(&msg),
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => (),
        }
    }
}

impl Handler<ServerMessage> for RendezvousSession {
    type Result = ();

    /// Handles events sent from the server to this session.
    fn handle(&mut self, msg: ServerMessage, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg) {
            Ok(text) => ctx.text(text),
            Err(e) => {
                // Serialization error: drop this event, keep the connection.
                warn!("[Session] Failed to serialize {}: {}", msg.event_name(), e);
            }
        }
    }
}

/// Error code for a frame that failed to decode. A malformed `connectionInfo` payload
/// (non-IPv4 `ip`, out-of-range `port`) is reported as such; anything else is an invalid message.
fn rejection_code(text: &str) -> ErrorCode {
    let event = serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("event")?.as_str().map(str::to_owned));
    match event.as_deref() {
        Some("connectionInfo") => ErrorCode::InvalidConnectionInfo,
        _ => ErrorCode::InvalidMessage,
    }
}

/// WebSocket endpoint for the signaling channel.
///
/// No query parameters: the player identifies itself with `findMatch`.
pub async fn ws_matchmaking(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<crate::server::state::AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(
        RendezvousSession::new(data.rendezvous_addr.clone()),
        &req,
        stream,
    )
}
