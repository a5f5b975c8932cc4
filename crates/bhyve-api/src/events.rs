//! Local publish/subscribe surface.
//!
//! Every notification the adapter produces (session token, user id, device
//! list, stream messages, errors, stream termination) flows through one
//! [`EventBus`] backed by a [`tokio::sync::broadcast`] channel. Consumers
//! either take the raw receiver via [`EventBus::subscribe`] or a filtered
//! [`Stream`](futures_core::Stream) of one [`EventKind`] via
//! [`EventBus::subscribe_kind`].

use std::fmt;

use futures_core::Stream;
use secrecy::SecretString;
use tokio::sync::broadcast;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── ClientEvent ──────────────────────────────────────────────────────

/// A notification published by the session manager or stream bridge.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A session token was issued by the authentication exchange.
    Token(SecretString),
    /// The user identifier returned alongside the token.
    UserId(String),
    /// Raw device list payload, passed through untouched.
    Devices(serde_json::Value),
    /// An inbound stream frame, verbatim.
    Message(String),
    /// A failure from any operation.
    Error(Error),
    /// The real-time connection ended.
    Closed(StreamClosed),
}

impl ClientEvent {
    /// The kind of this event, for filtering.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Token(_) => EventKind::Token,
            Self::UserId(_) => EventKind::UserId,
            Self::Devices(_) => EventKind::Devices,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Closed(_) => EventKind::Closed,
        }
    }
}

/// Discriminant of [`ClientEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Token,
    UserId,
    Devices,
    Message,
    Error,
    Closed,
}

impl EventKind {
    /// Wire-style name of the event (`token`, `user_id`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::UserId => "user_id",
            Self::Devices => "devices",
            Self::Message => "message",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why and how a stream connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamClosed {
    /// WebSocket close code, when the transport reported one.
    pub code: Option<u16>,
    pub reason: String,
}

// ── EventBus ─────────────────────────────────────────────────────────

/// Cheaply cloneable publisher shared by the session manager and the
/// stream bridge.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Receive every event published after this call.
    ///
    /// If a consumer falls behind it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Receive only events of `kind`.
    ///
    /// The stream skips over lag (logging how many events were dropped)
    /// and ends once every publisher is gone.
    pub fn subscribe_kind(&self, kind: EventKind) -> impl Stream<Item = ClientEvent> + use<> {
        let mut rx = self.tx.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) if event.kind() == kind => yield event,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%kind, skipped, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub(crate) fn publish(&self, event: ClientEvent) {
        tracing::trace!(kind = %event.kind(), "publishing event");
        let _ = self.tx.send(event);
    }
}
