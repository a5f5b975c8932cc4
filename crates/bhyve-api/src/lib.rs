// bhyve-api: Async Rust client for the Orbit B-hyve cloud (session + real-time stream)

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod stream;
pub mod transport;

pub use client::BhyveClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::Error;
pub use events::{ClientEvent, EventBus, EventKind, StreamClosed};
pub use session::{RequestContext, Session, SessionManager, SessionState};
pub use stream::{
    Connector, KEEPALIVE_INTERVAL, Link, Signal, StreamBridge, StreamHandle, StreamState,
    TokenSource, WsConnector,
};
