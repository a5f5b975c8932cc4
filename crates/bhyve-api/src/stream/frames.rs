// Outbound real-time frames.
//
// Inbound frames are opaque and republished verbatim; only the two frames
// the bridge itself sends are modelled here.

use serde::Serialize;

use crate::error::Error;

/// A frame sent by the bridge, tagged on `event`.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundFrame<'a> {
    /// In-band authentication, sent once when the transport opens.
    AppConnection { orbit_session_token: &'a str },
    /// Application-level keepalive.
    Ping,
}

impl OutboundFrame<'_> {
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Frame name without the token, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AppConnection { .. } => "app_connection",
            Self::Ping => "ping",
        }
    }
}
