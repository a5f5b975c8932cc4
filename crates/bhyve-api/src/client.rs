// B-hyve client facade
//
// One object owning the event bus, the session manager, and the stream
// bridge. The bridge reads the manager's token through a shared snapshot
// handle; it never mutates session state.

use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::events::{ClientEvent, EventBus, EventKind};
use crate::session::{Session, SessionManager, SessionState};
use crate::stream::{Connector, StreamBridge, StreamHandle, StreamState, WsConnector};

/// Client for the B-hyve cloud: session REST calls plus the real-time
/// event stream, with every outcome also published as a [`ClientEvent`].
pub struct BhyveClient<C = WsConnector> {
    config: Arc<ClientConfig>,
    events: EventBus,
    session: SessionManager,
    stream: StreamBridge<C>,
}

impl BhyveClient {
    /// Create a client using the tokio-tungstenite transport.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::with_connector(config, WsConnector)
    }
}

impl<C: Connector> BhyveClient<C> {
    /// Create a client with a custom stream transport.
    pub fn with_connector(config: ClientConfig, connector: C) -> Result<Self, Error> {
        let config = Arc::new(config);
        let events = EventBus::new();
        let session = SessionManager::new(Arc::clone(&config), events.clone())?;
        let stream = StreamBridge::new(&config, connector, session.reader(), events.clone());

        Ok(Self {
            config,
            events,
            session,
            stream,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Receive only events of one kind.
    pub fn subscribe_kind(&self, kind: EventKind) -> impl Stream<Item = ClientEvent> + use<C> {
        self.events.subscribe_kind(kind)
    }

    // ── Session ──────────────────────────────────────────────────────

    /// See [`SessionManager::authenticate`].
    pub async fn authenticate(&self) -> Result<Session, Error> {
        self.session.authenticate().await
    }

    /// See [`SessionManager::list_devices`].
    pub async fn list_devices(&self) -> Result<serde_json::Value, Error> {
        self.session.list_devices().await
    }

    /// Current session snapshot.
    pub fn session(&self) -> Arc<SessionState> {
        self.session.state()
    }

    // ── Stream ───────────────────────────────────────────────────────

    /// See [`StreamBridge::connect`].
    pub fn connect_stream(&self) -> Result<StreamHandle, Error> {
        self.stream.connect()
    }

    /// Tear down the current stream connection, if any.
    pub fn disconnect_stream(&self) {
        self.stream.disconnect();
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream.state()
    }
}
