//! End-to-end relay scenarios driven through the wire protocol.
//!
//! Each client is an mpsc endpoint standing in for a WebSocket; frames
//! go in as JSON text exactly as a browser would send them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use lingocast_relay::{
    decode_frame, BroadcastClaims, ConnectionId, ConnectionRegistry, LanguageChannelTable,
    LivenessConfig, LivenessMonitor, MessageRouter, ServerMessage, SessionManager, TokenVerifier,
};

const SECRET: &str = "test-shared-secret";

struct Relay {
    registry: Arc<ConnectionRegistry>,
    channels: Arc<LanguageChannelTable>,
    session: SessionManager,
    monitor: LivenessMonitor,
}

fn relay_with_timeout(timeout: Duration) -> Relay {
    let registry = Arc::new(ConnectionRegistry::new());
    let channels = Arc::new(LanguageChannelTable::new(["es", "en", "ro"]));
    let router = Arc::new(MessageRouter::new(
        Arc::clone(&registry),
        Arc::clone(&channels),
    ));
    let session = SessionManager::new(
        Arc::clone(&registry),
        Arc::clone(&channels),
        Arc::clone(&router),
        Arc::new(TokenVerifier::new(SECRET)),
    );
    let monitor = LivenessMonitor::new(
        Arc::clone(&registry),
        Arc::clone(&channels),
        router,
        LivenessConfig {
            sweep_interval: Duration::from_millis(10),
            broadcaster_timeout: timeout,
        },
    );
    Relay {
        registry,
        channels,
        session,
        monitor,
    }
}

fn relay() -> Relay {
    relay_with_timeout(Duration::from_secs(30))
}

impl Relay {
    fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(64);
        (self.registry.create(tx), rx)
    }

    /// Feed one frame through the wire decoder into the session manager.
    fn send(&self, conn: ConnectionId, frame: &str) {
        self.session.handle(conn, decode_frame(frame).unwrap());
    }
}

fn valid_token() -> String {
    let now = chrono::Utc::now().timestamp();
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &BroadcastClaims {
            iat: now,
            exp: now + 3600,
        },
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

#[tokio::test]
async fn broadcast_handshake_round_trip() {
    let relay = relay();
    let (b, mut brx) = relay.connect();
    let (a, mut arx) = relay.connect();

    // Broadcaster registers for "es" with a valid token.
    relay.send(
        b,
        &format!(
            r#"{{"type":"broadcaster","language":"es","token":"{}","clientId":"b1"}}"#,
            valid_token()
        ),
    );
    drain(&mut brx);

    // Listener A requests an offer.
    relay.send(a, r#"{"type":"request-offer","language":"es","clientId":"a"}"#);

    let to_broadcaster = drain(&mut brx);
    assert!(to_broadcaster.iter().any(
        |m| matches!(m, ServerMessage::RequestOffer { client_id } if client_id.as_str() == "a")
    ));
    assert!(to_broadcaster.iter().any(
        |m| matches!(m, ServerMessage::ListenersCount { listeners } if listeners["es"] == 1)
    ));

    // Broadcaster initiates the handshake toward A.
    relay.send(
        b,
        r#"{"type":"offer","offer":{"sdp":"v=0 offer","type":"offer"},"target":"a"}"#,
    );
    match arx.recv().await {
        Some(ServerMessage::Offer { offer, .. }) => assert_eq!(offer["sdp"], "v=0 offer"),
        other => panic!("unexpected message: {:?}", other),
    }

    // A answers, addressing the broadcaster by identity.
    relay.send(
        a,
        r#"{"type":"answer","answer":{"sdp":"v=0 answer","type":"answer"},"target":"b1"}"#,
    );
    match brx.recv().await {
        Some(ServerMessage::Answer { answer, client_id }) => {
            assert_eq!(answer["sdp"], "v=0 answer");
            assert_eq!(client_id.map(|c| c.to_string()), Some("a".to_string()));
        }
        other => panic!("unexpected message: {:?}", other),
    }

    // Count for "es" stayed at 1 throughout.
    assert_eq!(relay.channels.counts()["es"], 1);
}

#[tokio::test]
async fn listener_can_address_anonymous_broadcaster_by_synthetic_target() {
    let relay = relay();
    let (b, mut brx) = relay.connect();
    let (a, _arx) = relay.connect();

    relay.send(
        b,
        &format!(
            r#"{{"type":"broadcaster","language":"en","token":"{}"}}"#,
            valid_token()
        ),
    );
    relay.send(a, r#"{"type":"request-offer","language":"en","clientId":"a"}"#);
    drain(&mut brx);

    relay.send(
        a,
        r#"{"type":"candidate","candidate":{"candidate":"candidate:1"},"target":"broadcaster"}"#,
    );
    assert!(drain(&mut brx)
        .iter()
        .any(|m| matches!(m, ServerMessage::Candidate { .. })));
}

#[tokio::test]
async fn invalid_token_is_rejected_explicitly() {
    let relay = relay();
    let (b, mut brx) = relay.connect();

    relay.send(
        b,
        r#"{"type":"broadcaster","language":"es","token":"garbage"}"#,
    );

    assert!(matches!(
        brx.recv().await,
        Some(ServerMessage::Unauthorized { language, .. }) if language == "es"
    ));
    assert!(relay.channels.broadcaster("es").is_none());
    // The connection survives the rejection.
    assert!(relay.registry.is_connected(b));
}

#[tokio::test]
async fn second_broadcaster_replaces_first_and_receives_requests() {
    let relay = relay();
    let (b1, mut b1rx) = relay.connect();
    let (b2, mut b2rx) = relay.connect();
    let (a, _arx) = relay.connect();

    let token = valid_token();
    relay.send(
        b1,
        &format!(r#"{{"type":"broadcaster","language":"es","token":"{token}","clientId":"b1"}}"#),
    );
    relay.send(
        b2,
        &format!(r#"{{"type":"broadcaster","language":"es","token":"{token}","clientId":"b2"}}"#),
    );

    // The displaced broadcaster's stop must not clear the new slot.
    relay.send(b1, r#"{"type":"stop-broadcast","language":"es"}"#);
    assert_eq!(
        relay.channels.broadcaster("es").map(|r| r.connection),
        Some(b2)
    );

    drain(&mut b1rx);
    drain(&mut b2rx);
    relay.send(a, r#"{"type":"request-offer","language":"es","clientId":"a"}"#);

    assert!(drain(&mut b2rx)
        .iter()
        .any(|m| matches!(m, ServerMessage::RequestOffer { .. })));
    assert!(drain(&mut b1rx)
        .iter()
        .all(|m| !matches!(m, ServerMessage::RequestOffer { .. })));
}

#[tokio::test]
async fn unclean_broadcaster_death_frees_slot_within_timeout() {
    let relay = relay_with_timeout(Duration::from_millis(30));
    let (b, _brx) = relay.connect();
    let (a, _arx) = relay.connect();

    relay.send(
        b,
        &format!(
            r#"{{"type":"broadcaster","language":"es","token":"{}"}}"#,
            valid_token()
        ),
    );
    assert!(relay.channels.broadcaster("es").is_some());

    // The socket goes silent without a close event.
    tokio::time::sleep(Duration::from_millis(50)).await;
    relay.monitor.sweep();
    assert!(relay.channels.broadcaster("es").is_none());

    // A subsequent request-offer is dropped silently, with no stale forward.
    relay.send(a, r#"{"type":"request-offer","language":"es","clientId":"a"}"#);
    assert_eq!(relay.channels.counts()["es"], 1);
    assert!(relay.channels.broadcaster("es").is_none());
}

#[tokio::test]
async fn listener_reconnect_keeps_count_stable() {
    let relay = relay();
    let (b, mut brx) = relay.connect();
    relay.send(
        b,
        &format!(
            r#"{{"type":"broadcaster","language":"ro","token":"{}"}}"#,
            valid_token()
        ),
    );

    let (old_conn, _old_rx) = relay.connect();
    relay.send(
        old_conn,
        r#"{"type":"request-offer","language":"ro","clientId":"a"}"#,
    );
    assert_eq!(relay.channels.counts()["ro"], 1);

    // Tab reconnects with the same durable identity; old close arrives late.
    let (new_conn, mut new_rx) = relay.connect();
    relay.send(
        new_conn,
        r#"{"type":"request-offer","language":"ro","clientId":"a"}"#,
    );
    assert_eq!(relay.channels.counts()["ro"], 1);

    relay.session.on_socket_closed(old_conn);
    assert_eq!(relay.channels.counts()["ro"], 1);

    // Handshake traffic reaches the new connection.
    drain(&mut brx);
    relay.send(
        b,
        r#"{"type":"offer","offer":{"sdp":"v=0"},"target":"a"}"#,
    );
    assert!(drain(&mut new_rx)
        .iter()
        .any(|m| matches!(m, ServerMessage::Offer { .. })));
}

#[tokio::test]
async fn counts_reach_all_broadcasters_across_languages() {
    let relay = relay();
    let (bes, mut bes_rx) = relay.connect();
    let (ben, mut ben_rx) = relay.connect();
    let (a, _arx) = relay.connect();

    let token = valid_token();
    relay.send(
        bes,
        &format!(r#"{{"type":"broadcaster","language":"es","token":"{token}"}}"#),
    );
    relay.send(
        ben,
        &format!(r#"{{"type":"broadcaster","language":"en","token":"{token}"}}"#),
    );
    drain(&mut bes_rx);
    drain(&mut ben_rx);

    relay.send(a, r#"{"type":"request-offer","language":"es","clientId":"a"}"#);

    // Both broadcasters see the full per-language count map.
    for rx in [&mut bes_rx, &mut ben_rx] {
        let msgs = drain(rx);
        let counts = msgs.iter().find_map(|m| match m {
            ServerMessage::ListenersCount { listeners } => Some(listeners.clone()),
            _ => None,
        });
        let counts = counts.expect("broadcaster missed the counts push");
        assert_eq!(counts["es"], 1);
        assert_eq!(counts["en"], 0);
        assert_eq!(counts["ro"], 0);
    }
}

#[tokio::test]
async fn stop_listening_and_socket_close_both_settle_counts() {
    let relay = relay();
    let (b, mut brx) = relay.connect();
    relay.send(
        b,
        &format!(
            r#"{{"type":"broadcaster","language":"es","token":"{}"}}"#,
            valid_token()
        ),
    );

    let (a, _arx) = relay.connect();
    let (c, _crx) = relay.connect();
    relay.send(a, r#"{"type":"request-offer","language":"es","clientId":"a"}"#);
    relay.send(c, r#"{"type":"request-offer","language":"es","clientId":"c"}"#);
    assert_eq!(relay.channels.counts()["es"], 2);

    relay.send(a, r#"{"type":"stop-listening","language":"es","clientId":"a"}"#);
    assert_eq!(relay.channels.counts()["es"], 1);

    relay.session.on_socket_closed(c);
    assert_eq!(relay.channels.counts()["es"], 0);

    let msgs = drain(&mut brx);
    let last_counts = msgs.iter().rev().find_map(|m| match m {
        ServerMessage::ListenersCount { listeners } => Some(listeners["es"]),
        _ => None,
    });
    assert_eq!(last_counts, Some(0));
}

#[tokio::test]
async fn malformed_frame_is_discarded_without_closing() {
    let relay = relay();
    let (conn, _rx) = relay.connect();

    assert!(decode_frame("{broken json").is_err());
    assert!(decode_frame(r#"{"type":"unknown-kind"}"#).is_err());

    // The connection is untouched by the bad frames.
    assert!(relay.registry.is_connected(conn));
}
