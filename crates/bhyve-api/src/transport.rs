// Shared transport configuration for building reqwest::Client instances.
//
// The session exchange and the authenticated request context both build
// their HTTP clients here, so timeout and user-agent settings live in one
// place.

use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::config::ClientConfig;
use crate::error::Error;

const USER_AGENT: &str = concat!("bhyve-api/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: crate::config::DEFAULT_TIMEOUT,
            user_agent: USER_AGENT.to_owned(),
        }
    }
}

impl From<&ClientConfig> for TransportConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            timeout: config.timeout(),
            ..Self::default()
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Build a `reqwest::Client` with additional default headers.
    ///
    /// Used by the request context to inject the `orbit-session-token` header.
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::HttpClient(format!("failed to build HTTP client: {e}")))
    }
}
