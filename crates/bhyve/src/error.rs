//! CLI error types with miette diagnostics.
//!
//! Maps library and configuration errors into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use bhyve_api::Error as ApiError;
use bhyve_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(bhyve::auth_failed),
        help("Verify the account email and password (--email, --password or BHYVE_PASSWORD).")
    )]
    AuthFailed { message: String },

    #[error("No credentials configured: {missing} is not set")]
    #[diagnostic(
        code(bhyve::no_credentials),
        help(
            "Pass --email and --password, set BHYVE_EMAIL / BHYVE_PASSWORD,\n\
             or add them to {path}"
        )
    )]
    NoCredentials { missing: &'static str, path: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the B-hyve service: {message}")]
    #[diagnostic(
        code(bhyve::connection_failed),
        help("Check network connectivity and the --base-url / --wss-url settings.")
    )]
    ConnectionFailed { message: String },

    #[error("Timed out: {message}")]
    #[diagnostic(
        code(bhyve::timeout),
        help("Increase --timeout (REST) or --ws-timeout (stream handshake), in milliseconds.")
    )]
    Timeout { message: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({status}): {message}")]
    #[diagnostic(code(bhyve::api_error))]
    Api { status: u16, message: String },

    #[error(transparent)]
    #[diagnostic(code(bhyve::client))]
    Client(ApiError),

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(bhyve::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(bhyve::config))]
    Config(Box<figment::Error>),

    // ── Output ───────────────────────────────────────────────────────
    #[error("Could not render JSON output: {0}")]
    #[diagnostic(code(bhyve::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::Api { .. } | Self::Client(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Authentication { message, .. } => Self::AuthFailed { message },
            ApiError::NotAuthenticated
            | ApiError::SessionExpired
            | ApiError::InvalidSessionToken(_) => Self::AuthFailed {
                message: err.to_string(),
            },
            ApiError::Transport(ref source) if source.is_timeout() => Self::Timeout {
                message: err.to_string(),
            },
            ApiError::HandshakeTimeout { .. } => Self::Timeout {
                message: err.to_string(),
            },
            ApiError::Transport(_)
            | ApiError::WebSocket(_)
            | ApiError::UnexpectedResponse { .. } => Self::ConnectionFailed {
                message: err.to_string(),
            },
            ApiError::Api { status, message } => Self::Api { status, message },
            ApiError::InvalidConfig { field, reason } => Self::Validation {
                field: field.into(),
                reason,
            },
            other => Self::Client(other),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { missing } => Self::NoCredentials {
                missing,
                path: bhyve_config::config_path().display().to_string(),
            },
            ConfigError::Figment(err) => Self::Config(err),
        }
    }
}
