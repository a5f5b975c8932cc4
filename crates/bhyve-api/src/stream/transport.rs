// Real-time transport seam.
//
// The bridge never touches a socket directly. A `Connector` opens a `Link`:
// an outbound text sender plus an inbound `Signal` receiver. `WsConnector`
// is the production implementation over tokio-tungstenite; tests plug in a
// channel-backed connector and drive the signals by hand.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::error::Error;

/// Observation points of the underlying transport.
#[derive(Debug)]
pub enum Signal {
    /// The upgrade completed and frames can be sent.
    Open,
    /// An inbound text frame, verbatim.
    Message(String),
    /// A transport failure. A `Close` follows when the socket is gone.
    Error(Error),
    /// The transport is closed; no further signals follow.
    Close { code: u16, reason: String },
    /// Transport-level ping frame (answered by the transport itself).
    Ping(Vec<u8>),
    /// The upgrade request got a plain HTTP response instead of a socket.
    UnexpectedResponse { status: u16 },
}

/// One open (or opening) transport connection.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub signals: mpsc::UnboundedReceiver<Signal>,
}

/// Opens transport connections for the stream bridge.
pub trait Connector: Send + Sync + 'static {
    /// Start connecting to `url`. Progress is reported through the
    /// returned link's signals, starting with `Open` or an error.
    fn open(&self, url: &Url, handshake_timeout: Duration) -> Link;
}

// ── WsConnector ──────────────────────────────────────────────────────

/// Close code reported when the socket dies without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when the bridge drops its side of the link.
const NORMAL_CLOSURE: u16 = 1000;

/// tokio-tungstenite backed connector. Requires a running Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &Url, handshake_timeout: Duration) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(
            url.clone(),
            handshake_timeout,
            outbound_rx,
            signal_tx,
        ));

        Link {
            outbound: outbound_tx,
            signals: signal_rx,
        }
    }
}

/// Drive one socket: handshake, then pump frames both ways until either
/// side goes away. Always ends with a `Close` signal.
async fn run_socket(
    url: Url,
    handshake_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<String>,
    signals: mpsc::UnboundedSender<Signal>,
) {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let connect = tokio_tungstenite::connect_async(url.as_str());
    let ws_stream = match tokio::time::timeout(handshake_timeout, connect).await {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(tungstenite::Error::Http(response))) => {
            let status = response.status().as_u16();
            let _ = signals.send(Signal::UnexpectedResponse { status });
            fail(&signals, Error::UnexpectedResponse { status });
            return;
        }
        Ok(Err(e)) => {
            fail(&signals, Error::WebSocket(e.to_string()));
            return;
        }
        Err(_) => {
            let timeout_ms = u64::try_from(handshake_timeout.as_millis()).unwrap_or(u64::MAX);
            fail(&signals, Error::HandshakeTimeout { timeout_ms });
            return;
        }
    };

    tracing::info!("WebSocket connected");
    let _ = signals.send(Signal::Open);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            next = outbound.recv() => {
                if let Some(text) = next {
                    if let Err(e) = write.send(Message::text(text)).await {
                        fail(&signals, Error::WebSocket(e.to_string()));
                        return;
                    }
                } else {
                    // Bridge side is gone: close politely.
                    let _ = write.close().await;
                    let _ = signals.send(Signal::Close {
                        code: NORMAL_CLOSURE,
                        reason: "client closed".into(),
                    });
                    return;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = signals.send(Signal::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Some(text) = binary_text(&bytes) {
                            let _ = signals.send(Signal::Message(text));
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        // tungstenite queues the pong reply itself
                        let _ = signals.send(Signal::Ping(payload.to_vec()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or_else(
                            || (ABNORMAL_CLOSURE, String::new()),
                            |cf| (u16::from(cf.code), cf.reason.as_str().to_owned()),
                        );
                        let _ = signals.send(Signal::Close { code, reason });
                        return;
                    }
                    Some(Ok(_)) => {
                        // Pong, raw Frame -- ignore
                    }
                    Some(Err(e)) => {
                        fail(&signals, Error::WebSocket(e.to_string()));
                        return;
                    }
                    None => {
                        let _ = signals.send(Signal::Close {
                            code: ABNORMAL_CLOSURE,
                            reason: "stream ended".into(),
                        });
                        return;
                    }
                }
            }
        }
    }
}

/// Text carried in a binary frame. Frames that are not UTF-8 cannot be
/// republished as a message and are dropped with a warning.
fn binary_text(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(text.to_owned()),
        Err(e) => {
            tracing::warn!(len = bytes.len(), error = %e, "dropping non-UTF-8 binary frame");
            None
        }
    }
}

/// Report a fatal transport error followed by the abnormal close.
fn fail(signals: &mpsc::UnboundedSender<Signal>, err: Error) {
    let reason = err.to_string();
    let _ = signals.send(Signal::Error(err));
    let _ = signals.send(Signal::Close {
        code: ABNORMAL_CLOSURE,
        reason,
    });
}
