//! Settings type definitions.
//!
//! All types use camelCase JSON field names and `#[serde(default)]`, so a
//! settings file only needs the keys it overrides.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "connection": { "server": "https://chat.example.com", "team": "acme" },
///   "session": { "requestTimeoutMs": 5000, "malformedFrames": "fail" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TdlinkSettings {
    /// Where and how to connect.
    pub connection: ConnectionSettings,
    /// Session timing and queue limits.
    pub session: SessionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TdlinkSettings {
    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;
        if s.outbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "session.outboundCapacity must be at least 1".into(),
            ));
        }
        if s.subscription_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "session.subscriptionCapacity must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("requestTimeoutMs", s.request_timeout_ms),
            ("writeTimeoutMs", s.write_timeout_ms),
            ("closeGraceMs", s.close_grace_ms),
            ("deliveryTimeoutMs", s.delivery_timeout_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!(
                    "session.{name} must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Connection endpoint and handshake headers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Explicit WebSocket URL. Takes precedence over `server` + `team`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP(S) base URL of the service.
    pub server: String,
    /// Team the messaging endpoint is scoped to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Value of the `token` handshake header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Extra handshake headers.
    pub headers: BTreeMap<String, String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: None,
            server: "http://127.0.0.1:8080".to_string(),
            team: None,
            token: None,
            headers: BTreeMap::new(),
        }
    }
}

/// What the dispatcher does with an inbound frame it cannot parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedFramePolicy {
    /// Log the frame at WARN, drop it, and keep reading.
    #[default]
    Skip,
    /// Latch a session failure.
    Fail,
}

/// Session timing and queue limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Default timeout for waits and pings.
    pub request_timeout_ms: u64,
    /// Deadline for a single frame write.
    pub write_timeout_ms: u64,
    /// How long `close` waits for the peer's closure acknowledgement.
    pub close_grace_ms: u64,
    /// Bounded outbound queue capacity, in frames.
    pub outbound_capacity: usize,
    /// Per-listener delivery attempt bound.
    pub delivery_timeout_ms: u64,
    /// Buffered events per subscription.
    pub subscription_capacity: usize,
    /// Handling of unparsable inbound frames.
    pub malformed_frames: MalformedFramePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            close_grace_ms: 2_000,
            outbound_capacity: 32,
            delivery_timeout_ms: 500,
            subscription_capacity: 64,
            malformed_frames: MalformedFramePolicy::Skip,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
