//! Messaging endpoint derivation.
//!
//! The service publishes its HTTP base URL; the event channel for a team
//! lives at `/messaging/{team}` on the same host with the scheme switched to
//! its WebSocket counterpart.

use thiserror::Error;
use url::Url;

/// Errors building the messaging URL.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// The server URL did not parse.
    #[error("invalid server URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// Parser message.
        reason: String,
    },
    /// The scheme has no WebSocket counterpart.
    #[error("unsupported scheme {0}, expected http(s) or ws(s)")]
    UnsupportedScheme(String),
    /// No team to scope the endpoint to.
    #[error("team is required to derive the messaging URL")]
    MissingTeam,
}

/// Build `ws(s)://host[:port]/messaging/{team}` from an HTTP(S) base URL.
pub fn messaging_url(server: &str, team: &str) -> Result<Url, EndpointError> {
    let team = team.trim();
    if team.is_empty() {
        return Err(EndpointError::MissingTeam);
    }

    let mut url = Url::parse(server).map_err(|e| EndpointError::InvalidUrl {
        url: server.to_owned(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(EndpointError::UnsupportedScheme(other.to_owned())),
    };
    url.set_scheme(scheme)
        .map_err(|()| EndpointError::UnsupportedScheme(scheme.to_owned()))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| EndpointError::UnsupportedScheme(scheme.to_owned()))?;
        let _ = segments.clear().push("messaging").push(team);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn http_becomes_ws() {
        let url = messaging_url("http://localhost:8080", "acme").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/messaging/acme");
    }

    #[test]
    fn https_becomes_wss_and_path_is_replaced() {
        let url = messaging_url("https://chat.example.com/api/v4?x=1#frag", "t-1").unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/messaging/t-1");
    }

    #[test]
    fn ws_scheme_is_kept() {
        let url = messaging_url("wss://chat.example.com", "acme").unwrap();
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn team_is_a_single_segment() {
        let url = messaging_url("http://h", "a/b").unwrap();
        assert_eq!(url.path(), "/messaging/a%2Fb");
    }

    #[test]
    fn empty_team_rejected() {
        assert_matches!(messaging_url("http://h", "  "), Err(EndpointError::MissingTeam));
    }

    #[test]
    fn unsupported_scheme_rejected() {
        assert_matches!(
            messaging_url("ftp://h", "acme"),
            Err(EndpointError::UnsupportedScheme(s)) if s == "ftp"
        );
    }

    #[test]
    fn garbage_rejected() {
        assert_matches!(
            messaging_url("not a url", "acme"),
            Err(EndpointError::InvalidUrl { .. })
        );
    }
}
