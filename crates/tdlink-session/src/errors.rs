//! Transport and session error types.
//!
//! Both enums are `Clone`: a fatal error is latched once and then handed to
//! every blocked and future caller, so variants carry rendered messages
//! instead of non-cloneable source errors.

use tdlink_core::CodecError;
use thiserror::Error;

use crate::endpoint::EndpointError;

/// WebSocket close code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Connection-level errors. Always fatal to the session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying handshake or I/O failure.
        reason: String,
    },
    /// A handshake header name or value is not valid HTTP.
    #[error("invalid handshake header {name}: {reason}")]
    InvalidHeader {
        /// Header name as configured.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The peer sent a close frame.
    #[error("connection closed by peer (code {code}): {reason}")]
    Closed {
        /// Close status code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
    /// The connection ended without a close frame.
    #[error("connection dropped without a close handshake")]
    Dropped,
    /// A single frame write exceeded its deadline.
    #[error("write timed out after {timeout_ms}ms")]
    WriteTimeout {
        /// The deadline that elapsed.
        timeout_ms: u64,
    },
    /// Any other protocol or I/O failure.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl TransportError {
    /// The peer completed a normal-closure handshake.
    pub fn is_normal_closure(&self) -> bool {
        matches!(self, Self::Closed { code, .. } if *code == NORMAL_CLOSURE)
    }

    /// The connection is gone, cleanly or not.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Dropped)
    }
}

/// Errors surfaced by [`Session`](crate::Session) operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// An inbound frame could not be parsed and the session is configured to fail on it.
    #[error("malformed inbound frame: {0}")]
    MalformedFrame(CodecError),
    /// A wait elapsed without a matching event. Local to that one call.
    #[error("timed out after {timeout_ms}ms waiting for {kind}")]
    Timeout {
        /// The kind being waited for.
        kind: String,
        /// The elapsed timeout.
        timeout_ms: u64,
    },
    /// The session was closed, or is closing.
    #[error("session already closed")]
    AlreadyClosed,
    /// The server signalled a fatal fault.
    #[error("session aborted by server: {reason}")]
    ServerAbort {
        /// Reason given by the server.
        reason: String,
    },
    /// An outbound event failed to encode or inbound params failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The endpoint URL could not be built.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl SessionError {
    /// Whether this error terminates the session (as opposed to failing one call).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::MalformedFrame(_) | Self::ServerAbort { .. }
        )
    }

    pub(crate) fn timeout(kind: &str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            kind: kind.to_owned(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
