#![allow(clippy::unwrap_used)]
// Stream bridge tests: a channel-backed connector, a fixed token source,
// and a paused Tokio clock.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;

use bhyve_api::{
    ClientConfig, ClientEvent, Error, EventBus, EventKind, KEEPALIVE_INTERVAL, Signal,
    StreamBridge, StreamState, TokenSource,
};
use common::{MockConnector, PING, advance, drain, settle};

// ── Fixtures ────────────────────────────────────────────────────────

#[derive(Default)]
struct FixedToken(Mutex<Option<String>>);

impl FixedToken {
    fn set(&self, token: Option<&str>) {
        *self.0.lock().unwrap() = token.map(str::to_string);
    }
}

impl TokenSource for FixedToken {
    fn token(&self) -> Option<SecretString> {
        self.0.lock().unwrap().clone().map(SecretString::from)
    }
}

struct Fixture {
    bridge: StreamBridge<MockConnector>,
    connector: MockConnector,
    tokens: Arc<FixedToken>,
    events: EventBus,
}

fn fixture(token: Option<&str>) -> Fixture {
    let config = ClientConfig::builder()
        .wss_url("ws://events.test/v1/events")
        .ws_timeout(Duration::from_millis(750))
        .email("gardener@example.com")
        .password("hunter2".to_string())
        .build()
        .unwrap();
    let connector = MockConnector::default();
    let tokens = Arc::new(FixedToken::default());
    tokens.set(token);
    let events = EventBus::new();
    let bridge = StreamBridge::new(
        &config,
        connector.clone(),
        Arc::clone(&tokens) as Arc<dyn TokenSource>,
        events.clone(),
    );
    Fixture {
        bridge,
        connector,
        tokens,
        events,
    }
}

// ── Connect ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_connect_without_token_fails_without_opening() {
    let fx = fixture(None);

    let result = fx.bridge.connect();

    assert!(matches!(result, Err(Error::NotAuthenticated)));
    assert_eq!(fx.connector.open_count(), 0);
    assert_eq!(fx.bridge.state(), StreamState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_connect_uses_configured_endpoint_and_timeout() {
    let fx = fixture(Some("tok-stream"));

    let handle = fx.bridge.connect().unwrap();
    let remote = fx.connector.take_remote();

    assert_eq!(remote.url.as_str(), "ws://events.test/v1/events");
    assert_eq!(remote.handshake_timeout, Duration::from_millis(750));
    assert_eq!(handle.state(), StreamState::Connecting);
}

// ── Keepalive ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_open_sends_auth_frame_then_pings_every_25s() {
    let fx = fixture(Some("tok-stream"));
    let handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();

    // Nothing is sent before the transport opens.
    settle().await;
    assert!(remote.drain_sent().is_empty());

    remote.signal(Signal::Open);
    settle().await;

    let sent = remote.drain_sent();
    assert_eq!(sent.len(), 1);
    let auth: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(
        auth,
        json!({ "event": "app_connection", "orbit_session_token": "tok-stream" })
    );
    assert_eq!(handle.state(), StreamState::KeepaliveActive);

    advance(KEEPALIVE_INTERVAL - Duration::from_millis(1)).await;
    assert!(remote.drain_sent().is_empty(), "ping fired early");

    advance(Duration::from_millis(1)).await;
    assert_eq!(remote.drain_sent(), vec![PING.to_string()]);

    advance(Duration::from_millis(50_000)).await;
    assert_eq!(remote.drain_sent(), vec![PING.to_string(), PING.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_three_pings_after_75s() {
    let fx = fixture(Some("tok-stream"));
    let _handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();

    remote.signal(Signal::Open);
    settle().await;
    assert_eq!(remote.drain_sent().len(), 1);

    advance(Duration::from_millis(75_000)).await;
    let pings = remote.drain_sent();
    assert_eq!(pings.len(), 3);
    assert!(pings.iter().all(|frame| frame == PING));
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_keepalive_and_publishes_closed() {
    let fx = fixture(Some("tok-stream"));
    let handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();
    let mut rx = fx.events.subscribe();

    remote.signal(Signal::Open);
    settle().await;
    advance(KEEPALIVE_INTERVAL).await;
    assert_eq!(remote.drain_sent().len(), 2);

    remote.signal(Signal::Close {
        code: 1001,
        reason: "going away".into(),
    });
    settle().await;
    assert_eq!(handle.state(), StreamState::Closed);

    advance(KEEPALIVE_INTERVAL * 4).await;
    assert!(remote.drain_sent().is_empty(), "keepalive fired after close");
    assert!(remote.sent.is_closed());

    let closed: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::Closed(closed) => Some(closed),
            _ => None,
        })
        .collect();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].code, Some(1001));
    assert_eq!(closed[0].reason, "going away");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_keepalive() {
    let fx = fixture(Some("tok-stream"));
    let handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();

    remote.signal(Signal::Open);
    settle().await;
    remote.drain_sent();

    fx.bridge.disconnect();
    handle.closed().await;
    assert_eq!(fx.bridge.state(), StreamState::Closed);

    advance(KEEPALIVE_INTERVAL * 3).await;
    assert!(remote.drain_sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_bridge_ends_connection() {
    let fx = fixture(Some("tok-stream"));
    let handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();
    let mut rx = fx.events.subscribe();

    remote.signal(Signal::Open);
    settle().await;
    remote.drain_sent();

    let watcher = handle.clone();
    drop(handle);
    drop(fx.bridge);
    settle().await;

    assert!(watcher.is_closed());
    advance(KEEPALIVE_INTERVAL * 3).await;
    assert!(remote.drain_sent().is_empty(), "keepalive fired after owner dropped");
    assert!(remote.sent.is_closed());

    let kinds: Vec<_> = drain(&mut rx).iter().map(ClientEvent::kind).collect();
    assert_eq!(kinds, vec![EventKind::Closed]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replaces_previous_connection() {
    let fx = fixture(Some("tok-stream"));

    let first = fx.bridge.connect().unwrap();
    let mut first_remote = fx.connector.take_remote();
    first_remote.signal(Signal::Open);
    settle().await;
    first_remote.drain_sent();

    let second = fx.bridge.connect().unwrap();
    let mut second_remote = fx.connector.take_remote();
    second_remote.signal(Signal::Open);
    settle().await;

    assert!(first.is_closed());
    assert_eq!(second.state(), StreamState::KeepaliveActive);
    assert_eq!(second_remote.drain_sent().len(), 1);

    advance(KEEPALIVE_INTERVAL).await;
    assert!(first_remote.drain_sent().is_empty());
    assert_eq!(second_remote.drain_sent(), vec![PING.to_string()]);
}

// ── Inbound signals ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_messages_are_republished_verbatim() {
    let fx = fixture(Some("tok-stream"));
    let _handle = fx.bridge.connect().unwrap();
    let remote = fx.connector.take_remote();
    let mut rx = fx.events.subscribe();

    let frames = [
        r#"{"event":"watering_in_progress_notification","device_id":"dev-1","current_station":2}"#,
        r#"{"event":"change_mode","mode":"off"}"#,
        "not json at all",
        "",
    ];

    remote.signal(Signal::Open);
    for frame in frames {
        remote.signal(Signal::Message(frame.to_string()));
    }
    settle().await;

    let messages: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            ClientEvent::Message(text) => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(messages, frames.map(String::from).to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_is_republished() {
    let fx = fixture(Some("tok-stream"));
    let handle = fx.bridge.connect().unwrap();
    let remote = fx.connector.take_remote();
    let mut rx = fx.events.subscribe();

    remote.signal(Signal::Open);
    remote.signal(Signal::Error(Error::WebSocket("connection reset".into())));
    settle().await;

    let events = drain(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        ClientEvent::Error(Error::WebSocket(msg)) if msg == "connection reset"
    )));
    // An error alone does not end the connection; the close signal does.
    assert_eq!(handle.state(), StreamState::KeepaliveActive);
}

#[tokio::test(start_paused = true)]
async fn test_error_before_open_closes_without_sending() {
    let fx = fixture(Some("tok-stream"));
    let handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();
    let mut rx = fx.events.subscribe();

    remote.signal(Signal::UnexpectedResponse { status: 403 });
    remote.signal(Signal::Error(Error::UnexpectedResponse { status: 403 }));
    remote.signal(Signal::Close {
        code: 1006,
        reason: "handshake rejected".into(),
    });
    settle().await;

    assert_eq!(handle.state(), StreamState::Closed);
    assert!(remote.drain_sent().is_empty());

    let kinds: Vec<_> = drain(&mut rx).iter().map(ClientEvent::kind).collect();
    assert_eq!(kinds, vec![EventKind::Error, EventKind::Closed]);
}

#[tokio::test(start_paused = true)]
async fn test_transport_ping_is_diagnostic_only() {
    let fx = fixture(Some("tok-stream"));
    let _handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();
    let mut rx = fx.events.subscribe();

    remote.signal(Signal::Open);
    remote.signal(Signal::Ping(b"hb".to_vec()));
    settle().await;

    assert!(drain(&mut rx).is_empty());
    assert_eq!(remote.drain_sent().len(), 1);
}

// ── Token lookup ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_auth_frame_uses_token_current_at_open() {
    let fx = fixture(Some("tok-old"));
    let _handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();

    // Token refreshed while the transport is still connecting.
    fx.tokens.set(Some("tok-new"));
    remote.signal(Signal::Open);
    settle().await;

    let sent = remote.drain_sent();
    let auth: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(auth["orbit_session_token"], "tok-new");
}

#[tokio::test(start_paused = true)]
async fn test_token_gone_at_open_closes_with_error() {
    let fx = fixture(Some("tok-old"));
    let handle = fx.bridge.connect().unwrap();
    let mut remote = fx.connector.take_remote();
    let mut rx = fx.events.subscribe();

    fx.tokens.set(None);
    remote.signal(Signal::Open);
    settle().await;

    assert!(remote.drain_sent().is_empty());
    assert_eq!(handle.state(), StreamState::Closed);
    let events = drain(&mut rx);
    assert!(matches!(events[0], ClientEvent::Error(Error::NotAuthenticated)));
    assert_eq!(events[1].kind(), EventKind::Closed);
}
