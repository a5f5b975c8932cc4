use std::sync::Arc;

use thiserror::Error;

/// Top-level error type for the `bhyve-api` crate.
///
/// Covers every failure mode of the adapter: session authentication,
/// HTTP transport, the devices endpoint, the real-time stream, and
/// configuration. The type is `Clone` so the same value can be returned
/// to the caller and published on the `error` event; sources that are
/// not themselves cloneable are held behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The session endpoint rejected the exchange (bad credentials, locked
    /// account, server error).
    #[error("Authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    /// An operation that needs a session token was called before
    /// [`authenticate`](crate::SessionManager::authenticate) succeeded.
    #[error("Not authenticated -- call authenticate() first")]
    NotAuthenticated,

    /// Another `authenticate()` call on the same manager has not resolved yet.
    #[error("Authentication already in progress")]
    AuthenticationInProgress,

    /// The session endpoint issued a token that cannot be sent back in the
    /// `orbit-session-token` header.
    #[error("Session token cannot be used as a request header: {0}")]
    InvalidSessionToken(String),

    /// The session token was rejected by an authenticated endpoint.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(Arc<reqwest::Error>),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Building the underlying HTTP client failed.
    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    // ── REST API ────────────────────────────────────────────────────
    /// Non-success response from an authenticated REST endpoint.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Real-time stream ────────────────────────────────────────────
    /// WebSocket connect, read, or write failure.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The WebSocket upgrade did not complete within the handshake timeout.
    #[error("WebSocket handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// The server answered the WebSocket upgrade with a plain HTTP response.
    #[error("Unexpected response to WebSocket upgrade (HTTP {status})")]
    UnexpectedResponse { status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Encoding an outbound frame failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ── Configuration ───────────────────────────────────────────────
    /// A configuration value failed validation.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl Error {
    /// Wrap a `reqwest` failure.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        Self::Transport(Arc::new(err))
    }

    /// Returns `true` if re-running `authenticate()` might resolve this error.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. }
                | Self::NotAuthenticated
                | Self::InvalidSessionToken(_)
                | Self::SessionExpired
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// The adapter itself never retries; this is a hint for callers.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::HandshakeTimeout { .. } | Self::WebSocket(_) => true,
            Self::Authentication { status, .. } | Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The HTTP status code behind this error, if there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. }
            | Self::Api { status, .. }
            | Self::UnexpectedResponse { status } => Some(*status),
            Self::SessionExpired => Some(401),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
