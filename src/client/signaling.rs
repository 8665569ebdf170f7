//! Websocket connector for the signaling channel (peer side).
//!
//! Owns the socket in one local task that forwards typed messages both ways, answers
//! server pings, and ends when either side goes away.

use awc::error::WsProtocolError;
use awc::ws;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::protocol::{ClientMessage, ServerMessage};

/// Connects to `url` and returns the outgoing sender and the incoming event stream.
///
/// Must be called from within an actix system: the awc connection is not `Send`.
pub async fn connect(
    url: &str,
) -> Result<(mpsc::UnboundedSender<ClientMessage>, mpsc::UnboundedReceiver<ServerMessage>), ClientError> {
    let (_response, framed) = awc::Client::new()
        .ws(url)
        .connect()
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;
    info!("[Peer] Connected to signaling server {}", url);

    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    actix::spawn(pump(framed, outgoing_rx, incoming_tx));
    Ok((outgoing_tx, incoming_rx))
}

async fn pump<S>(
    mut socket: S,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    incoming: mpsc::UnboundedSender<ServerMessage>,
) where
    S: Stream<Item = Result<ws::Frame, WsProtocolError>> + Sink<ws::Message, Error = WsProtocolError> + Unpin,
{
    loop {
        tokio::select! {
            msg = outgoing.recv() => match msg {
                Some(msg) => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("[Peer] Failed to serialize outgoing message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = socket.send(ws::Message::Text(text.into())).await {
                        warn!("[Peer] Signaling send failed: {}", e);
                        break;
                    }
                }
                None => {
                    let _ = socket.send(ws::Message::Close(None)).await;
                    break;
                }
            },
            frame = socket.next() => match frame {
                Some(Ok(ws::Frame::Text(bytes))) => match serde_json::from_slice::<ServerMessage>(&bytes) {
                    Ok(msg) => {
                        if incoming.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("[Peer] Dropped invalid server message: {}", e),
                },
                Some(Ok(ws::Frame::Ping(data))) => {
                    if let Err(e) = socket.send(ws::Message::Pong(data)).await {
                        warn!("[Peer] Pong failed: {}", e);
                        break;
                    }
                }
                Some(Ok(ws::Frame::Close(reason))) => {
                    debug!("[Peer] Server closed the signaling channel: {:?}", reason);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("[Peer] Signaling protocol error: {}", e);
                    break;
                }
                None => break,
            },
        }
    }
    info!("[Peer] Signaling connection closed");
}
