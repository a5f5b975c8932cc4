// Shared fixtures for the stream integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use url::Url;

use bhyve_api::{ClientEvent, Connector, Link, Signal};

pub const PING: &str = r#"{"event":"ping"}"#;

// ── Mock transport ──────────────────────────────────────────────────

/// The test's side of one opened link.
pub struct Remote {
    pub url: Url,
    pub handshake_timeout: Duration,
    pub signals: mpsc::UnboundedSender<Signal>,
    pub sent: mpsc::UnboundedReceiver<String>,
}

impl Remote {
    pub fn signal(&self, signal: Signal) {
        self.signals.send(signal).unwrap();
    }

    /// Everything the bridge has sent so far.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    pub opened: Arc<Mutex<Vec<Remote>>>,
}

impl MockConnector {
    pub fn take_remote(&self) -> Remote {
        self.opened.lock().unwrap().remove(0)
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &Url, handshake_timeout: Duration) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        self.opened.lock().unwrap().push(Remote {
            url: url.clone(),
            handshake_timeout,
            signals: signal_tx,
            sent: outbound_rx,
        });
        Link {
            outbound: outbound_tx,
            signals: signal_rx,
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Let spawned tasks and fired timers run to quiescence.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

pub fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
