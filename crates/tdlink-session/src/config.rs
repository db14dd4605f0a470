//! Session configuration.

use std::time::Duration;

use tdlink_settings::{MalformedFramePolicy, SessionSettings, TdlinkSettings};

use crate::endpoint::{EndpointError, messaging_url};

/// Handshake header carrying the access token.
pub const TOKEN_HEADER: &str = "token";

/// Runtime configuration for one [`Session`](crate::Session).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// WebSocket URL to open.
    pub url: String,
    /// Headers attached to the opening handshake.
    pub headers: Vec<(String, String)>,
    /// Default timeout for waits and confirmed sends.
    pub request_timeout: Duration,
    /// Deadline for one frame write.
    pub write_timeout: Duration,
    /// How long `close` waits for the closure acknowledgement.
    pub close_grace: Duration,
    /// Outbound queue capacity, in frames.
    pub outbound_capacity: usize,
    /// Bound on a single delivery attempt to one listener.
    pub delivery_timeout: Duration,
    /// Buffered events per subscription.
    pub subscription_capacity: usize,
    /// Handling of unparsable inbound frames.
    pub malformed_frames: MalformedFramePolicy,
}

impl SessionConfig {
    /// Default limits for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_limits(url.into(), Vec::new(), &SessionSettings::default())
    }

    /// Add a handshake header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Build from loaded settings.
    ///
    /// An explicit `connection.url` wins; otherwise the URL is derived from
    /// `connection.server` and `connection.team`.
    pub fn from_settings(settings: &TdlinkSettings) -> Result<Self, EndpointError> {
        let conn = &settings.connection;
        let url = match &conn.url {
            Some(url) => url.clone(),
            None => {
                let team = conn.team.as_deref().ok_or(EndpointError::MissingTeam)?;
                messaging_url(&conn.server, team)?.to_string()
            }
        };

        let mut headers: Vec<(String, String)> = conn
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(token) = &conn.token {
            headers.push((TOKEN_HEADER.to_owned(), token.clone()));
        }

        Ok(Self::with_limits(url, headers, &settings.session))
    }

    fn with_limits(url: String, headers: Vec<(String, String)>, s: &SessionSettings) -> Self {
        Self {
            url,
            headers,
            request_timeout: Duration::from_millis(s.request_timeout_ms),
            write_timeout: Duration::from_millis(s.write_timeout_ms),
            close_grace: Duration::from_millis(s.close_grace_ms),
            outbound_capacity: s.outbound_capacity.max(1),
            delivery_timeout: Duration::from_millis(s.delivery_timeout_ms),
            subscription_capacity: s.subscription_capacity.max(1),
            malformed_frames: s.malformed_frames,
        }
    }
}
