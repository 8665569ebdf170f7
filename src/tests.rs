//! End-to-end rendezvous scenarios.
//!
//! Most tests drive the `RendezvousServer` actor directly, registering recording actors in
//! place of websocket sessions. The last one runs the real HTTP server and two
//! `PeerClient`s over loopback.

use std::net::Ipv4Addr;
use std::time::Duration;

use actix::prelude::*;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::protocol::{ConnectionInfo, FindMatchRequest, RelayRequest, Role, ServerMessage};
use crate::server::matchmaking::messages::{
    Connect, Disconnect, FindMatch, GetLobbyStats, LeaveQueue, LobbyStats, RelayChat, ReportConnectionInfo,
};
use crate::server::matchmaking::server::RendezvousServer;
use crate::server::matchmaking::types::ConnectionId;

const WAIT: Duration = Duration::from_secs(2);

/// Stands in for a websocket session: forwards every server event to a channel.
struct Recorder {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Actor for Recorder {
    type Context = Context<Self>;
}

impl Handler<ServerMessage> for Recorder {
    type Result = ();

    fn handle(&mut self, msg: ServerMessage, _ctx: &mut Self::Context) {
        let _ = self.tx.send(msg);
    }
}

struct TestPeer {
    connection: ConnectionId,
    player_id: String,
    server: Addr<RendezvousServer>,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl TestPeer {
    async fn connect(server: &Addr<RendezvousServer>, player_id: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Recorder { tx }.start();
        let connection = ConnectionId::new();
        server
            .send(Connect {
                connection,
                addr: recorder.recipient(),
            })
            .await
            .unwrap();
        Self {
            connection,
            player_id: player_id.to_string(),
            server: server.clone(),
            rx,
        }
    }

    async fn find_match(&self, name: &str) {
        self.server
            .send(FindMatch {
                connection: self.connection,
                request: FindMatchRequest {
                    player_id: Some(self.player_id.clone()),
                    player_name: Some(name.to_string()),
                },
            })
            .await
            .unwrap();
    }

    async fn report(&self, last_octet: u8, port: u16) {
        self.server
            .send(ReportConnectionInfo {
                connection: self.connection,
                info: ConnectionInfo {
                    ip: Ipv4Addr::new(198, 51, 100, last_octet),
                    port,
                },
            })
            .await
            .unwrap();
    }

    async fn relay(&self, target: &str, message: &str) {
        self.server
            .send(RelayChat {
                connection: self.connection,
                request: RelayRequest {
                    target_player_id: target.to_string(),
                    message: message.to_string(),
                    sender_name: self.player_id.clone(),
                },
            })
            .await
            .unwrap();
    }

    async fn disconnect(&self) {
        self.server
            .send(Disconnect {
                connection: self.connection,
            })
            .await
            .unwrap();
    }

    async fn next(&mut self) -> ServerMessage {
        timeout(WAIT, self.rx.recv())
            .await
            .expect("no server event in time")
            .expect("recorder channel closed")
    }

    /// Returns the match id of the `matchFound` + `requestConnectionInfo` pair.
    async fn expect_matched(&mut self, opponent_name: &str, role: Role) -> String {
        let match_id = match self.next().await {
            ServerMessage::MatchFound {
                match_id,
                opponent,
                your_role,
                ..
            } => {
                assert_eq!(opponent.player_name, opponent_name);
                assert_eq!(your_role, role);
                match_id
            }
            other => panic!("expected matchFound, got {:?}", other),
        };
        assert_eq!(self.next().await, ServerMessage::RequestConnectionInfo);
        match_id
    }

    async fn assert_silent(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(msg) = self.rx.try_recv() {
            panic!("unexpected event {:?}", msg);
        }
    }
}

async fn stats(server: &Addr<RendezvousServer>) -> LobbyStats {
    server.send(GetLobbyStats).await.unwrap()
}

/// Alice and Bob queue and get paired; returns them with the match id.
async fn matched_pair(server: &Addr<RendezvousServer>) -> (TestPeer, TestPeer, String) {
    let mut alice = TestPeer::connect(server, "alice-id").await;
    let mut bob = TestPeer::connect(server, "bob-id").await;
    alice.find_match("Alice").await;
    assert!(matches!(alice.next().await, ServerMessage::QueueStatus { position: 1, .. }));
    bob.find_match("Bob").await;
    assert!(matches!(bob.next().await, ServerMessage::QueueStatus { position: 2, .. }));

    let match_id = alice.expect_matched("Bob", Role::Player1).await;
    assert_eq!(bob.expect_matched("Alice", Role::Player2).await, match_id);
    (alice, bob, match_id)
}

#[actix::test]
async fn test_two_players_meet_and_get_each_others_address() {
    let server = RendezvousServer::new().start();
    let (mut alice, mut bob, match_id) = matched_pair(&server).await;
    assert!(match_id.starts_with("match_"));

    alice.report(10, 40000).await;
    alice.assert_silent().await;
    bob.assert_silent().await;
    bob.report(20, 41000).await;

    match alice.next().await {
        ServerMessage::StartP2P {
            match_id: id,
            opponent,
            your_info,
            ..
        } => {
            assert_eq!(id, match_id);
            assert_eq!(opponent.player_id, "bob-id");
            assert_eq!(opponent.ip, Ipv4Addr::new(198, 51, 100, 20));
            assert_eq!(opponent.port, 41000);
            assert_eq!(your_info.ip, Ipv4Addr::new(198, 51, 100, 10));
            assert_eq!(your_info.port, 40000);
        }
        other => panic!("expected startP2P, got {:?}", other),
    }
    match bob.next().await {
        ServerMessage::StartP2P { opponent, your_info, .. } => {
            assert_eq!(opponent.player_name, "Alice");
            assert_eq!(opponent.port, 40000);
            assert_eq!(your_info.port, 41000);
        }
        other => panic!("expected startP2P, got {:?}", other),
    }

    let stats = stats(&server).await;
    assert_eq!(stats.active_matches, 1);
    assert_eq!(stats.ready_matches, 1);
    assert_eq!(stats.queued, 0);
}

#[actix::test]
async fn test_third_player_waits_for_a_fourth() {
    let server = RendezvousServer::new().start();
    let (_alice, _bob, _) = matched_pair(&server).await;

    let mut carol = TestPeer::connect(&server, "carol-id").await;
    carol.find_match("Carol").await;
    assert!(matches!(carol.next().await, ServerMessage::QueueStatus { position: 1, .. }));
    carol.assert_silent().await;
    assert_eq!(stats(&server).await.queued, 1);

    let mut dave = TestPeer::connect(&server, "dave-id").await;
    dave.find_match("Dave").await;
    assert!(matches!(dave.next().await, ServerMessage::QueueStatus { .. }));
    carol.expect_matched("Dave", Role::Player1).await;
    dave.expect_matched("Carol", Role::Player2).await;
    assert_eq!(stats(&server).await.active_matches, 2);
}

#[actix::test]
async fn test_disconnect_before_ready_notifies_opponent_once() {
    let server = RendezvousServer::new().start();
    let (mut alice, mut bob, _) = matched_pair(&server).await;

    alice.report(10, 40000).await;
    bob.disconnect().await;
    assert!(matches!(alice.next().await, ServerMessage::OpponentDisconnected { .. }));

    // The match is gone: a late report starts nothing.
    alice.report(10, 40000).await;
    alice.assert_silent().await;
    bob.assert_silent().await;

    let stats = stats(&server).await;
    assert_eq!(stats.active_matches, 0);
    assert_eq!(stats.connections, 1);
}

#[actix::test]
async fn test_disconnect_after_ready_notifies_opponent_once() {
    let server = RendezvousServer::new().start();
    let (mut alice, mut bob, _) = matched_pair(&server).await;
    alice.report(10, 40000).await;
    bob.report(20, 41000).await;
    assert!(matches!(alice.next().await, ServerMessage::StartP2P { .. }));
    assert!(matches!(bob.next().await, ServerMessage::StartP2P { .. }));
    assert_eq!(stats(&server).await.ready_matches, 1);

    alice.disconnect().await;
    assert!(matches!(bob.next().await, ServerMessage::OpponentDisconnected { .. }));
    bob.assert_silent().await;
    alice.assert_silent().await;

    let stats = stats(&server).await;
    assert_eq!(stats.active_matches, 0);
    assert_eq!(stats.ready_matches, 0);
}

#[actix::test]
async fn test_repeated_report_does_not_restart_p2p() {
    let server = RendezvousServer::new().start();
    let (mut alice, mut bob, _) = matched_pair(&server).await;
    alice.report(10, 40000).await;
    bob.report(20, 41000).await;
    assert!(matches!(alice.next().await, ServerMessage::StartP2P { .. }));
    assert!(matches!(bob.next().await, ServerMessage::StartP2P { .. }));

    alice.report(10, 40001).await;
    alice.assert_silent().await;
    bob.assert_silent().await;
}

#[actix::test]
async fn test_relay_reaches_only_the_opponent() {
    let server = RendezvousServer::new().start();
    let (mut alice, mut bob, _) = matched_pair(&server).await;

    alice.relay("bob-id", "hello through the server").await;
    match bob.next().await {
        ServerMessage::P2pMessage {
            sender_name,
            message,
            timestamp,
        } => {
            assert_eq!(sender_name, "alice-id");
            assert_eq!(message, "hello through the server");
            assert!(timestamp > 0);
        }
        other => panic!("expected p2pMessage, got {:?}", other),
    }

    // Someone outside the match cannot be targeted.
    let mut eve = TestPeer::connect(&server, "eve-id").await;
    alice.relay("eve-id", "psst").await;
    eve.assert_silent().await;
    alice.assert_silent().await;
}

#[actix::test]
async fn test_invalid_connection_info_is_rejected() {
    let server = RendezvousServer::new().start();
    let (mut alice, mut bob, _) = matched_pair(&server).await;

    alice.report(10, 0).await;
    match alice.next().await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "INVALID_CONNECTION_INFO"),
        other => panic!("expected error, got {:?}", other),
    }
    bob.report(20, 41000).await;
    alice.assert_silent().await;
    bob.assert_silent().await;
    assert_eq!(stats(&server).await.ready_matches, 0);
}

#[actix::test]
async fn test_duplicate_joins_are_rejected() {
    let server = RendezvousServer::new().start();
    let mut alice = TestPeer::connect(&server, "alice-id").await;
    alice.find_match("Alice").await;
    assert!(matches!(alice.next().await, ServerMessage::QueueStatus { .. }));

    alice.find_match("Alice").await;
    assert!(matches!(alice.next().await, ServerMessage::Error { ref code, .. } if code == "ALREADY_QUEUED"));

    let mut impostor = TestPeer::connect(&server, "alice-id").await;
    impostor.find_match("Not Alice").await;
    assert!(matches!(impostor.next().await, ServerMessage::Error { ref code, .. } if code == "DUPLICATE_PLAYER"));
    assert_eq!(stats(&server).await.queued, 1);

    let mut bob = TestPeer::connect(&server, "bob-id").await;
    bob.find_match("Bob").await;
    assert!(matches!(bob.next().await, ServerMessage::QueueStatus { .. }));
    alice.expect_matched("Bob", Role::Player1).await;
    alice.find_match("Alice").await;
    assert!(matches!(alice.next().await, ServerMessage::Error { ref code, .. } if code == "ALREADY_IN_MATCH"));
}

#[actix::test]
async fn test_leave_queue_prevents_pairing() {
    let server = RendezvousServer::new().start();
    let mut alice = TestPeer::connect(&server, "alice-id").await;
    alice.find_match("Alice").await;
    assert!(matches!(alice.next().await, ServerMessage::QueueStatus { .. }));
    server
        .send(LeaveQueue {
            connection: alice.connection,
        })
        .await
        .unwrap();

    let mut bob = TestPeer::connect(&server, "bob-id").await;
    bob.find_match("Bob").await;
    assert!(matches!(bob.next().await, ServerMessage::QueueStatus { position: 1, .. }));
    bob.assert_silent().await;
    alice.assert_silent().await;
}

#[actix::test]
async fn test_anonymous_join_gets_default_identity() {
    let server = RendezvousServer::new().start();
    let mut alice = TestPeer::connect(&server, "unused").await;
    let mut bob = TestPeer::connect(&server, "bob-id").await;
    server
        .send(FindMatch {
            connection: alice.connection,
            request: FindMatchRequest::default(),
        })
        .await
        .unwrap();
    assert!(matches!(alice.next().await, ServerMessage::QueueStatus { .. }));
    bob.find_match("Bob").await;
    assert!(matches!(bob.next().await, ServerMessage::QueueStatus { .. }));

    match bob.next().await {
        ServerMessage::MatchFound { opponent, .. } => {
            let connection = alice.connection.to_string();
            assert_eq!(opponent.player_id, connection);
            assert_eq!(opponent.player_name, format!("Player_{}", &connection[..5]));
        }
        other => panic!("expected matchFound, got {:?}", other),
    }
}

/// Full stack: HTTP server, websocket sessions, two peer clients, STUN failing over
/// to loopback addresses, and chat over both transports.
#[actix::test]
async fn test_two_peer_clients_chat_over_loopback() {
    use crate::client::{ChatTransport, PeerClient, PeerEvent};
    use crate::config::peer::{AddressFallback, PeerConfig};
    use crate::config::server::SIGNALING_PATH;
    use crate::server::{router, state::AppState};
    use actix_web::{App, HttpServer, web};

    let state = web::Data::new(AppState::new(RendezvousServer::new().start()));
    let http = HttpServer::new(move || App::new().app_data(state.clone()).configure(router::config))
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();
    let port = http.addrs()[0].port();
    let running = http.run();
    let handle = running.handle();
    actix::spawn(running);

    let config = |id: &str, name: &str| PeerConfig {
        server_url: format!("ws://127.0.0.1:{}{}", port, SIGNALING_PATH),
        player_id: id.to_string(),
        player_name: name.to_string(),
        local_port: 0,
        stun_servers: vec![],
        fallback: AddressFallback::Loopback,
        self_test: false,
        ..PeerConfig::default()
    };

    async fn until<F>(events: &mut mpsc::UnboundedReceiver<PeerEvent>, mut wanted: F) -> PeerEvent
    where
        F: FnMut(&PeerEvent) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("event channel closed");
                if wanted(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not seen in time")
    }

    let (alice, mut alice_events) = PeerClient::connect(config("alice-id", "Alice")).await.unwrap();
    let (bob, mut bob_events) = PeerClient::connect(config("bob-id", "Bob")).await.unwrap();
    alice.find_match().unwrap();
    until(&mut alice_events, |e| matches!(e, PeerEvent::Queued { .. })).await;
    bob.find_match().unwrap();

    until(&mut alice_events, |e| matches!(e, PeerEvent::P2PReady { .. })).await;
    until(&mut bob_events, |e| matches!(e, PeerEvent::P2PReady { .. })).await;
    assert_eq!(alice.match_id(), bob.match_id());

    let delivery = alice.send_chat("hello bob").await.unwrap();
    assert!(delivery.direct && delivery.relayed);

    let mut seen = Vec::new();
    while seen.len() < 2 {
        if let PeerEvent::ChatReceived {
            sender,
            message,
            transport,
        } = until(&mut bob_events, |e| matches!(e, PeerEvent::ChatReceived { .. })).await
        {
            assert_eq!(message, "hello bob");
            assert_eq!(sender, "Alice");
            seen.push(transport);
        }
    }
    assert!(seen.contains(&ChatTransport::Direct));
    assert!(seen.contains(&ChatTransport::Relay));

    handle.stop(false).await;
}
