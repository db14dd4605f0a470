//! Duplex, message-oriented transport.
//!
//! A [`Connection`] is split at open time into a read half ([`FrameSource`])
//! and a write half ([`FrameSink`]). The session hands the read half to the
//! dispatcher loop and the write half to the writer loop; nothing else
//! touches either.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::TransportError;

pub use websocket::WebSocketConnector;

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame.
    ///
    /// Returns [`TransportError::Closed`] when the peer sends a close frame and
    /// [`TransportError::Dropped`] when the stream ends without one.
    async fn read_frame(&mut self) -> Result<Bytes, TransportError>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame. Deadlines are applied by the caller.
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Send a normal-closure close frame.
    async fn close_normally(&mut self, reason: &str) -> Result<(), TransportError>;
}

/// An open connection, already split into halves.
pub struct Connection {
    /// Read half.
    pub source: Box<dyn FrameSource>,
    /// Write half.
    pub sink: Box<dyn FrameSink>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`, sending `headers` with the handshake.
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Connection, TransportError>;
}
