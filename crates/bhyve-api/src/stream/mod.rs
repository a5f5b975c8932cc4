//! Real-time event stream bridge.
//!
//! Opens one transport connection to the B-hyve events endpoint,
//! authenticates in-band once the transport is open, keeps the connection
//! alive with an application-level ping every 25 seconds, and republishes
//! every inbound frame as a [`ClientEvent::Message`].
//!
//! Each connection runs in a single spawned task that owns its keepalive
//! interval, so the timer cannot outlive the connection: it is dropped on
//! every exit path (transport close, error before open, explicit
//! [`StreamHandle::disconnect`], dropping the [`StreamBridge`], or the
//! transport channel ending).
//!
//! # Example
//!
//! ```rust,ignore
//! use bhyve_api::{BhyveClient, ClientConfig, ClientEvent};
//!
//! let client = BhyveClient::new(config)?;
//! let mut rx = client.subscribe();
//! client.authenticate().await?;
//! let handle = client.connect_stream()?;
//!
//! while let Ok(event) = rx.recv().await {
//!     match event {
//!         ClientEvent::Message(text) => println!("{text}"),
//!         ClientEvent::Closed(_) => break,
//!         _ => {}
//!     }
//! }
//! handle.disconnect();
//! ```

mod frames;
mod transport;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

pub use frames::OutboundFrame;
pub use transport::{Connector, Link, Signal, WsConnector};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::events::{ClientEvent, EventBus, StreamClosed};
use crate::session::SessionState;

/// Period of the application-level keepalive ping.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);

// ── TokenSource ──────────────────────────────────────────────────────

/// Where the bridge reads the session token from at open time.
///
/// Implemented for the session manager's state handle; the bridge only
/// reads through it and never mutates session state.
pub trait TokenSource: Send + Sync + 'static {
    fn token(&self) -> Option<SecretString>;
}

impl TokenSource for arc_swap::ArcSwap<SessionState> {
    fn token(&self) -> Option<SecretString> {
        self.load().token().cloned()
    }
}

// ── StreamState ──────────────────────────────────────────────────────

/// Lifecycle of one stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No connection has been requested.
    Idle,
    /// Transport requested, not yet open.
    Connecting,
    /// Transport open and the authentication frame sent.
    Authenticated,
    /// Keepalive timer running.
    KeepaliveActive,
    /// Connection ended; the keepalive timer is gone.
    Closed,
}

// ── StreamHandle ─────────────────────────────────────────────────────

/// Handle to one running stream connection.
///
/// Cloning shares the same connection. Dropping every handle does not
/// stop the connection; call [`disconnect`](Self::disconnect) or drop the
/// owning [`StreamBridge`].
#[derive(Debug, Clone)]
pub struct StreamHandle {
    state: watch::Receiver<StreamState>,
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches [`StreamState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.state.clone();
        // Err means the task is gone, which also means closed.
        let _ = rx.wait_for(|state| *state == StreamState::Closed).await;
    }

    /// Tear the connection down and cancel its keepalive timer.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.state() == StreamState::Closed
    }
}

// ── StreamBridge ─────────────────────────────────────────────────────

/// Owns at most one real-time connection at a time.
pub struct StreamBridge<C = WsConnector> {
    connector: C,
    wss_url: Url,
    handshake_timeout: Duration,
    debug: bool,
    tokens: Arc<dyn TokenSource>,
    events: EventBus,
    active: Mutex<Option<StreamHandle>>,
}

impl<C: Connector> StreamBridge<C> {
    pub fn new(
        config: &ClientConfig,
        connector: C,
        tokens: Arc<dyn TokenSource>,
        events: EventBus,
    ) -> Self {
        Self {
            connector,
            wss_url: config.wss_url().clone(),
            handshake_timeout: config.ws_timeout(),
            debug: config.debug(),
            tokens,
            events,
            active: Mutex::new(None),
        }
    }

    /// Open the transport and start bridging its signals.
    ///
    /// Fails with [`Error::NotAuthenticated`] if no session token is
    /// stored. Any previous connection owned by this bridge is torn down
    /// first. Must be called from within a Tokio runtime.
    pub fn connect(&self) -> Result<StreamHandle, Error> {
        if self.tokens.token().is_none() {
            return Err(Error::NotAuthenticated);
        }

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            tracing::debug!("replacing existing stream connection");
            previous.disconnect();
        }

        let link = self.connector.open(&self.wss_url, self.handshake_timeout);
        let (state_tx, state_rx) = watch::channel(StreamState::Connecting);
        let cancel = CancellationToken::new();

        let connection = Connection {
            link,
            tokens: Arc::clone(&self.tokens),
            events: self.events.clone(),
            state: state_tx,
            cancel: cancel.clone(),
            debug: self.debug,
        };
        tokio::spawn(connection.run());

        let handle = StreamHandle {
            state: state_rx,
            cancel,
        };
        *active = Some(handle.clone());
        Ok(handle)
    }

    /// Tear down the current connection, if any.
    pub fn disconnect(&self) {
        if let Some(handle) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            handle.disconnect();
        }
    }

    /// State of the current (or most recent) connection.
    pub fn state(&self) -> StreamState {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(StreamState::Idle, StreamHandle::state)
    }
}

impl<C> Drop for StreamBridge<C> {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = active.take() {
            handle.disconnect();
        }
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

struct Connection {
    link: Link,
    tokens: Arc<dyn TokenSource>,
    events: EventBus,
    state: watch::Sender<StreamState>,
    cancel: CancellationToken,
    debug: bool,
}

impl Connection {
    async fn run(mut self) {
        // The keepalive interval is local to this task: whichever way the
        // loop exits, it is dropped before `Closed` is published.
        let mut keepalive: Option<Interval> = None;

        let closed = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    break StreamClosed { code: None, reason: "disconnected by client".into() };
                }
                signal = self.link.signals.recv() => {
                    let Some(signal) = signal else {
                        break StreamClosed { code: None, reason: "transport ended".into() };
                    };
                    if let Some(closed) = self.on_signal(signal, &mut keepalive) {
                        break closed;
                    }
                }
                () = next_tick(&mut keepalive) => {
                    if let Err(closed) = self.send(&OutboundFrame::Ping) {
                        break closed;
                    }
                }
            }
        };

        drop(keepalive);
        tracing::info!(code = ?closed.code, reason = %closed.reason, "stream connection closed");
        self.state.send_replace(StreamState::Closed);
        self.events.publish(ClientEvent::Closed(closed));
    }

    /// Handle one transport signal. Returns `Some` when the connection is over.
    fn on_signal(
        &self,
        signal: Signal,
        keepalive: &mut Option<Interval>,
    ) -> Option<StreamClosed> {
        match signal {
            Signal::Open => {
                if keepalive.is_some() {
                    tracing::warn!("duplicate open signal ignored");
                    return None;
                }
                if self.debug {
                    tracing::debug!("stream transport open");
                }
                if let Err(closed) = self.authenticate() {
                    return Some(closed);
                }
                self.state.send_replace(StreamState::Authenticated);

                *keepalive = Some(start_keepalive());
                self.state.send_replace(StreamState::KeepaliveActive);
                None
            }
            Signal::Message(text) => {
                if self.debug {
                    tracing::debug!(len = text.len(), "stream message received");
                }
                self.events.publish(ClientEvent::Message(text));
                None
            }
            Signal::Error(e) => {
                tracing::warn!(error = %e, "stream transport error");
                self.events.publish(ClientEvent::Error(e));
                None
            }
            Signal::Close { code, reason } => {
                if self.debug {
                    tracing::debug!(code, reason = %reason, "stream close signal");
                }
                Some(StreamClosed {
                    code: Some(code),
                    reason,
                })
            }
            Signal::Ping(payload) => {
                if self.debug {
                    tracing::debug!(len = payload.len(), "transport ping");
                } else {
                    tracing::trace!("transport ping");
                }
                None
            }
            Signal::UnexpectedResponse { status } => {
                tracing::error!(status, "unexpected response to WebSocket upgrade");
                None
            }
        }
    }

    /// Send the in-band authentication frame with the currently stored token.
    fn authenticate(&self) -> Result<(), StreamClosed> {
        let Some(token) = self.tokens.token() else {
            self.events.publish(ClientEvent::Error(Error::NotAuthenticated));
            return Err(StreamClosed {
                code: None,
                reason: "no session token for stream authentication".into(),
            });
        };

        self.send(&OutboundFrame::AppConnection {
            orbit_session_token: token.expose_secret(),
        })
    }

    fn send(&self, frame: &OutboundFrame<'_>) -> Result<(), StreamClosed> {
        let text = frame.encode().map_err(|e| StreamClosed {
            code: None,
            reason: e.to_string(),
        })?;
        if self.debug {
            tracing::debug!(frame = frame.name(), "sending stream frame");
        }
        self.link.outbound.send(text).map_err(|_| StreamClosed {
            code: None,
            reason: "transport closed before frame could be sent".into(),
        })
    }
}

/// First tick one full period after open, then every period.
fn start_keepalive() -> Interval {
    let mut interval =
        tokio::time::interval_at(Instant::now() + KEEPALIVE_INTERVAL, KEEPALIVE_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    interval
}

/// Resolve on the next keepalive tick, or never while no timer is armed.
async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
