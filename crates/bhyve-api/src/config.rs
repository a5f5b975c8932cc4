// ── Runtime connection configuration ──
//
// Describes *how* to reach the B-hyve cloud: endpoints, timeouts, and the
// credential pair. Built once, validated at construction, never mutated.
// Loading from files or the environment lives in `bhyve-config`.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// REST endpoint used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.orbitbhyve.com";

/// Real-time endpoint used when no WebSocket URL is configured.
pub const DEFAULT_WSS_URL: &str = "wss://api.orbitbhyve.com/v1/events";

/// Default REST request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default WebSocket handshake timeout.
pub const DEFAULT_WS_TIMEOUT: Duration = Duration::from_millis(1000);

/// Validated client configuration.
///
/// Construct through [`ClientConfig::builder`]. Every omitted option falls
/// back to the constant documented above; credentials have no default.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    wss_url: Url,
    timeout: Duration,
    ws_timeout: Duration,
    email: String,
    password: SecretString,
    debug: bool,
}

impl ClientConfig {
    /// Start building a configuration.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// REST base URL (e.g. `https://api.orbitbhyve.com`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Real-time event stream URL.
    pub fn wss_url(&self) -> &Url {
        &self.wss_url
    }

    /// REST request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// WebSocket handshake timeout.
    pub fn ws_timeout(&self) -> Duration {
        self.ws_timeout
    }

    /// Account identifier sent to the session endpoint.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Account secret sent to the session endpoint.
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Verbose diagnostics for every request, response, and transport signal.
    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    wss_url: Option<String>,
    timeout: Option<Duration>,
    ws_timeout: Option<Duration>,
    email: Option<String>,
    password: Option<SecretString>,
    debug: Option<bool>,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn wss_url(mut self, url: impl Into<String>) -> Self {
        self.wss_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn ws_timeout(mut self, timeout: Duration) -> Self {
        self.ws_timeout = Some(timeout);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn password(mut self, password: impl Into<SecretString>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Apply defaults and validate.
    pub fn build(self) -> Result<ClientConfig, Error> {
        let base_url = parse_url(
            "base_url",
            self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            &["http", "https"],
        )?;
        let wss_url = parse_url(
            "wss_url",
            self.wss_url.as_deref().unwrap_or(DEFAULT_WSS_URL),
            &["ws", "wss"],
        )?;

        let timeout = non_zero("timeout", self.timeout.unwrap_or(DEFAULT_TIMEOUT))?;
        let ws_timeout = non_zero("ws_timeout", self.ws_timeout.unwrap_or(DEFAULT_WS_TIMEOUT))?;

        let email = match self.email {
            Some(email) if !email.trim().is_empty() => email,
            _ => {
                return Err(Error::InvalidConfig {
                    field: "email",
                    reason: "an account email is required".into(),
                });
            }
        };

        let password = match self.password {
            Some(password) if !password.expose_secret().is_empty() => password,
            _ => {
                return Err(Error::InvalidConfig {
                    field: "password",
                    reason: "an account password is required".into(),
                });
            }
        };

        Ok(ClientConfig {
            base_url,
            wss_url,
            timeout,
            ws_timeout,
            email,
            password,
            debug: self.debug.unwrap_or(false),
        })
    }
}

fn parse_url(field: &'static str, raw: &str, schemes: &[&str]) -> Result<Url, Error> {
    let url = Url::parse(raw.trim()).map_err(|e| Error::InvalidConfig {
        field,
        reason: format!("invalid URL '{raw}': {e}"),
    })?;

    if !schemes.contains(&url.scheme()) {
        return Err(Error::InvalidConfig {
            field,
            reason: format!(
                "expected scheme {}, got '{}'",
                schemes.join(" or "),
                url.scheme()
            ),
        });
    }
    Ok(url)
}

fn non_zero(field: &'static str, value: Duration) -> Result<Duration, Error> {
    if value.is_zero() {
        return Err(Error::InvalidConfig {
            field,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
