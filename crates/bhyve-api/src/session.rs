// Session authentication and authenticated REST calls.
//
// `SessionManager` owns the credential pair, performs the
// `POST /v1/session` exchange, and keeps the resulting token and user id
// in an immutable `SessionState` snapshot that is swapped atomically on
// success. Failed exchanges never touch the stored state.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::events::{ClientEvent, EventBus};
use crate::transport::TransportConfig;

/// Session creation endpoint.
pub const SESSION_PATH: &str = "/v1/session";

/// Device listing endpoint (scoped by `user_id` query parameter).
pub const DEVICES_PATH: &str = "/v1/devices";

/// Header carrying the session token on authenticated REST calls.
pub const SESSION_TOKEN_HEADER: &str = "orbit-session-token";

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct SessionRequest<'a> {
    session: SessionCredentials<'a>,
}

#[derive(Serialize)]
struct SessionCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    orbit_session_token: String,
    #[serde(deserialize_with = "string_or_number")]
    user_id: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// Token and user id issued by a successful session exchange.
#[derive(Debug, Clone)]
pub struct Session {
    token: SecretString,
    user_id: String,
}

impl Session {
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Base URL, timeout, and authorization header reused by every REST call
/// after authentication.
#[derive(Debug, Clone)]
pub struct RequestContext {
    base_url: Url,
    timeout: Duration,
    http: reqwest::Client,
}

impl RequestContext {
    fn new(config: &ClientConfig, token: &SecretString) -> Result<Self, Error> {
        let mut value = HeaderValue::from_str(token.expose_secret())
            .map_err(|e| Error::InvalidSessionToken(e.to_string()))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_TOKEN_HEADER, value);

        let http = TransportConfig::from(config).build_client_with_headers(headers)?;
        Ok(Self {
            base_url: config.base_url().clone(),
            timeout: config.timeout(),
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// HTTP client carrying the `orbit-session-token` default header.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Build a full URL for an API path relative to the base URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        endpoint(&self.base_url, path)
    }
}

/// Everything the manager knows about the current session.
///
/// Either fully established (token, user id, and request context all
/// present) or empty. Readers get an `Arc` snapshot and never observe a
/// half-written state.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    active: Option<(Session, RequestContext)>,
}

impl SessionState {
    fn established(session: Session, context: RequestContext) -> Self {
        Self {
            active: Some((session, context)),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.active.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|(session, _)| session)
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.session().map(Session::token)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session().map(Session::user_id)
    }

    /// The request context, or `NotAuthenticated` before the first
    /// successful exchange.
    pub fn context(&self) -> Result<&RequestContext, Error> {
        self.active
            .as_ref()
            .map(|(_, context)| context)
            .ok_or(Error::NotAuthenticated)
    }
}

/// Shared read handle onto a manager's session state.
pub type SessionReader = Arc<ArcSwap<SessionState>>;

// ── SessionManager ───────────────────────────────────────────────────

/// Owns the credentials and the session state.
pub struct SessionManager {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
    state: SessionReader,
    in_flight: Mutex<()>,
    events: EventBus,
}

impl SessionManager {
    pub fn new(config: Arc<ClientConfig>, events: EventBus) -> Result<Self, Error> {
        let http = TransportConfig::from(config.as_ref()).build_client()?;
        Ok(Self {
            config,
            http,
            state: Arc::new(ArcSwap::from_pointee(SessionState::default())),
            in_flight: Mutex::new(()),
            events,
        })
    }

    /// Current session snapshot.
    pub fn state(&self) -> Arc<SessionState> {
        self.state.load_full()
    }

    /// Handle for components that read the token later (the stream bridge).
    pub fn reader(&self) -> SessionReader {
        Arc::clone(&self.state)
    }

    /// Exchange the credential pair for a session token.
    ///
    /// `POST /v1/session` with `{ "session": { "email", "password" } }`.
    ///
    /// On success the token and user id are stored, the request context is
    /// rebuilt, and `token` then `user_id` are published. On failure an
    /// `error` event is published and the previous state is kept. A call
    /// made while another is still in flight returns
    /// [`Error::AuthenticationInProgress`] without issuing a request.
    pub async fn authenticate(&self) -> Result<Session, Error> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| Error::AuthenticationInProgress)?;

        match self.create_session().await {
            Ok((session, context)) => {
                self.state.store(Arc::new(SessionState::established(
                    session.clone(),
                    context,
                )));
                info!(user_id = %session.user_id, "session established");

                self.events
                    .publish(ClientEvent::Token(session.token.clone()));
                self.events
                    .publish(ClientEvent::UserId(session.user_id.clone()));
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "authentication failed");
                self.events.publish(ClientEvent::Error(e.clone()));
                Err(e)
            }
        }
    }

    async fn create_session(&self) -> Result<(Session, RequestContext), Error> {
        let url = endpoint(self.config.base_url(), SESSION_PATH)?;
        debug!("creating session at {}", url);

        let body = SessionRequest {
            session: SessionCredentials {
                email: self.config.email(),
                password: self.config.password().expose_secret(),
            },
        };

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Error::transport)?;

        if !status.is_success() {
            return Err(Error::Authentication {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed: SessionResponse =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.clone(),
            })?;

        if self.config.debug() {
            debug!(user_id = %parsed.user_id, "session response received");
        }

        let token = SecretString::from(parsed.orbit_session_token);
        let context = RequestContext::new(&self.config, &token)?;
        Ok((
            Session {
                token,
                user_id: parsed.user_id,
            },
            context,
        ))
    }

    /// List the devices registered to the authenticated user.
    ///
    /// `GET /v1/devices?user_id={user_id}` with the `orbit-session-token`
    /// header. Fails with [`Error::NotAuthenticated`] and issues no request
    /// if no session has been established. The payload is published as
    /// `devices` and returned; a `{ "devices": [...] }` wrapper is unwrapped
    /// to the array, anything else is passed through as-is.
    pub async fn list_devices(&self) -> Result<serde_json::Value, Error> {
        let state = self.state.load_full();
        let context = state.context()?;
        let user_id = state.user_id().ok_or(Error::NotAuthenticated)?;

        match self.fetch_devices(context, user_id).await {
            Ok(devices) => {
                self.events.publish(ClientEvent::Devices(devices.clone()));
                Ok(devices)
            }
            Err(e) => {
                warn!(error = %e, "device listing failed");
                self.events.publish(ClientEvent::Error(e.clone()));
                Err(e)
            }
        }
    }

    async fn fetch_devices(
        &self,
        context: &RequestContext,
        user_id: &str,
    ) -> Result<serde_json::Value, Error> {
        let mut url = context.url(DEVICES_PATH)?;
        url.query_pairs_mut().append_pair("user_id", user_id);
        debug!("GET {}", url);

        let resp = context
            .http()
            .get(url)
            .send()
            .await
            .map_err(Error::transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::SessionExpired);
        }

        let text = resp.text().await.map_err(Error::transport)?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        if self.config.debug() {
            debug!(body = %text, "devices response received");
        }

        let payload: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: text.clone(),
            })?;

        Ok(unwrap_devices(payload))
    }
}

/// `{ "devices": [...] }` becomes `[...]`; any other shape is returned as-is.
fn unwrap_devices(payload: serde_json::Value) -> serde_json::Value {
    match payload {
        serde_json::Value::Object(mut map)
            if map.len() == 1 && map.get("devices").is_some_and(serde_json::Value::is_array) =>
        {
            map.remove("devices").unwrap_or_default()
        }
        other => other,
    }
}

/// Join an absolute API path onto the base URL, keeping any path prefix
/// the base URL already carries.
fn endpoint(base: &Url, path: &str) -> Result<Url, Error> {
    let full = format!("{}{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&full).map_err(Error::InvalidUrl)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn session_request_matches_wire_shape() {
        let body = SessionRequest {
            session: SessionCredentials {
                email: "gardener@example.com",
                password: "hunter2",
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "session": { "email": "gardener@example.com", "password": "hunter2" } })
        );
    }

    #[test]
    fn numeric_user_id_is_stored_as_string() {
        let parsed: SessionResponse =
            serde_json::from_value(json!({ "orbit_session_token": "tok", "user_id": 42 }))
                .unwrap();
        assert_eq!(parsed.user_id, "42");
    }

    #[test]
    fn missing_token_fails_to_parse() {
        let result =
            serde_json::from_value::<SessionResponse>(json!({ "user_id": "u-1" }));
        assert!(result.is_err());
    }

    #[test]
    fn devices_wrapper_is_unwrapped() {
        let wrapped = json!({ "devices": [{ "id": "d1" }] });
        assert_eq!(unwrap_devices(wrapped), json!([{ "id": "d1" }]));

        let bare = json!([{ "id": "d1" }, { "id": "d2" }]);
        assert_eq!(unwrap_devices(bare.clone()), bare);

        let other = json!({ "devices": [], "page": 2 });
        assert_eq!(unwrap_devices(other.clone()), other);
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let base = Url::parse("https://proxy.example/bhyve/").unwrap();
        let url = endpoint(&base, SESSION_PATH).unwrap();
        assert_eq!(url.as_str(), "https://proxy.example/bhyve/v1/session");
    }

    #[test]
    fn unusable_token_is_rejected_before_any_request() {
        let config = ClientConfig::builder()
            .email("gardener@example.com")
            .password("hunter2".to_string())
            .build()
            .unwrap();
        let token = SecretString::from("tok\nwith-newline".to_string());

        let err = RequestContext::new(&config, &token).unwrap_err();
        assert!(matches!(err, Error::InvalidSessionToken(_)));
        assert!(err.is_auth_failure());
    }

    #[test]
    fn empty_state_has_no_context() {
        let state = SessionState::default();
        assert!(!state.is_authenticated());
        assert!(state.token().is_none());
        assert!(matches!(state.context(), Err(Error::NotAuthenticated)));
    }
}
