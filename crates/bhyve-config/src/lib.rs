//! Configuration loading for B-hyve tools.
//!
//! Settings are layered with figment: the TOML config file, then `BHYVE_*`
//! environment variables, then caller overrides (usually CLI flags). The
//! merged [`Settings`] translate into a validated [`bhyve_api::ClientConfig`].
//! Nothing here writes credentials back to disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bhyve_api::{ClientConfig, Error as ApiError};

/// Prefix for environment overrides, e.g. `BHYVE_EMAIL`.
pub const ENV_PREFIX: &str = "BHYVE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured: {missing} is not set")]
    NoCredentials { missing: &'static str },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// One layer of configuration. Every field is optional; unset fields fall
/// through to the next layer and finally to the library defaults.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// REST base URL (e.g. "https://api.orbitbhyve.com").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Real-time events endpoint (e.g. "wss://api.orbitbhyve.com/v1/events").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wss_url: Option<String>,

    /// REST request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// WebSocket handshake timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Plaintext in the file is accepted; prefer `BHYVE_PASSWORD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("wss_url", &self.wss_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("ws_timeout_ms", &self.ws_timeout_ms)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("debug", &self.debug)
            .finish()
    }
}

impl Settings {
    /// Translate into a validated client configuration.
    ///
    /// Unset fields take the library defaults. Missing credentials are
    /// reported as [`ConfigError::NoCredentials`], everything the builder
    /// rejects as [`ConfigError::Validation`].
    pub fn into_client_config(self) -> Result<ClientConfig, ConfigError> {
        let email = self
            .email
            .filter(|e| !e.is_empty())
            .ok_or(ConfigError::NoCredentials { missing: "email" })?;
        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::NoCredentials {
                missing: "password",
            })?;

        let mut builder = ClientConfig::builder()
            .email(email)
            .password(SecretString::from(password));

        if let Some(url) = self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(url) = self.wss_url {
            builder = builder.wss_url(url);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.ws_timeout_ms {
            builder = builder.ws_timeout(Duration::from_millis(ms));
        }
        if let Some(debug) = self.debug {
            builder = builder.debug(debug);
        }

        builder.build().map_err(|e| match e {
            ApiError::InvalidConfig { field, reason } => ConfigError::Validation {
                field: field.into(),
                reason,
            },
            other => ConfigError::Validation {
                field: "config".into(),
                reason: other.to_string(),
            },
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "bhyve").map_or_else(
        || PathBuf::from(".bhyve").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered figment: file < environment < overrides.
pub fn figment(path: &Path, overrides: &Settings) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(overrides))
}

/// Load settings from `path` (or the default config path), the
/// environment, and `overrides`. A missing file is not an error.
pub fn load(path: Option<&Path>, overrides: &Settings) -> Result<Settings, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let settings: Settings = figment(&path, overrides).extract()?;
    Ok(settings)
}
