//! In-memory transport.
//!
//! [`pair`] returns a [`Connection`] for the session plus a [`RemotePeer`]
//! that plays the server: it pushes inbound frames, observes every write in
//! order, and can close, fail, stall, or drop the link.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tdlink_core::{CodecError, Event, encode};
use tokio::sync::mpsc;

use super::{Connection, Connector, FrameSink, FrameSource};
use crate::errors::{NORMAL_CLOSURE, TransportError};

type InboundTx = mpsc::UnboundedSender<Result<Bytes, TransportError>>;

/// Behavior of the in-memory peer.
#[derive(Clone, Copy, Debug)]
pub struct MemoryOptions {
    /// Answer a normal close with a normal close, like a well-behaved server.
    pub auto_ack_close: bool,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            auto_ack_close: true,
        }
    }
}

/// Something the session wrote to the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Written {
    /// A data frame.
    Frame(Bytes),
    /// A normal-closure close frame.
    Close {
        /// Close reason text.
        reason: String,
    },
}

/// How the write half behaves.
#[derive(Clone, Debug, Default)]
pub enum WriteMode {
    /// Writes succeed immediately.
    #[default]
    Accept,
    /// Writes never complete.
    Stall,
    /// Writes fail with the given error.
    Fail(TransportError),
}

/// A connected pair with default options.
pub fn pair() -> (Connection, RemotePeer) {
    pair_with(MemoryOptions::default())
}

/// A connected pair.
pub fn pair_with(options: MemoryOptions) -> (Connection, RemotePeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let mode = Arc::new(Mutex::new(WriteMode::Accept));

    let connection = Connection {
        source: Box::new(MemorySource { rx: inbound_rx }),
        sink: Box::new(MemorySink {
            written: written_tx,
            inbound: inbound_tx.clone(),
            mode: Arc::clone(&mode),
            auto_ack_close: options.auto_ack_close,
        }),
    };
    let peer = RemotePeer {
        inbound: inbound_tx,
        written: written_rx,
        mode,
    };
    (connection, peer)
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        self.rx.recv().await.unwrap_or(Err(TransportError::Dropped))
    }
}

struct MemorySink {
    written: mpsc::UnboundedSender<Written>,
    inbound: InboundTx,
    mode: Arc<Mutex<WriteMode>>,
    auto_ack_close: bool,
}

impl MemorySink {
    async fn check_mode(&self) -> Result<(), TransportError> {
        let mode = self.mode.lock().clone();
        match mode {
            WriteMode::Accept => Ok(()),
            WriteMode::Stall => std::future::pending().await,
            WriteMode::Fail(err) => Err(err),
        }
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.check_mode().await?;
        self.written
            .send(Written::Frame(frame))
            .map_err(|_| TransportError::Dropped)
    }

    async fn close_normally(&mut self, reason: &str) -> Result<(), TransportError> {
        self.check_mode().await?;
        self.written
            .send(Written::Close {
                reason: reason.to_owned(),
            })
            .map_err(|_| TransportError::Dropped)?;
        if self.auto_ack_close {
            let _ = self.inbound.send(Err(TransportError::Closed {
                code: NORMAL_CLOSURE,
                reason: reason.to_owned(),
            }));
        }
        Ok(())
    }
}

/// The far end of an in-memory connection.
pub struct RemotePeer {
    inbound: InboundTx,
    written: mpsc::UnboundedReceiver<Written>,
    mode: Arc<Mutex<WriteMode>>,
}

impl RemotePeer {
    /// Deliver a raw frame to the session.
    pub fn push(&self, frame: impl Into<Bytes>) {
        let _ = self.inbound.send(Ok(frame.into()));
    }

    /// Encode and deliver an event.
    pub fn push_event<P: Serialize>(&self, event: &Event<P>) -> Result<(), CodecError> {
        self.push(encode(event)?);
        Ok(())
    }

    /// Send a close frame with `code`.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(Err(TransportError::Closed {
            code,
            reason: reason.to_owned(),
        }));
    }

    /// Make the next read fail with `err`.
    pub fn fail(&self, err: TransportError) {
        let _ = self.inbound.send(Err(err));
    }

    /// Drop the link without a close frame.
    pub fn disconnect(self) {
        let _ = self.inbound.send(Err(TransportError::Dropped));
    }

    /// Change how subsequent writes behave.
    pub fn set_write_mode(&self, mode: WriteMode) {
        *self.mode.lock() = mode;
    }

    /// Wait for the next write. `None` once the write half is gone.
    pub async fn next_written(&mut self) -> Option<Written> {
        self.written.recv().await
    }

    /// The next write, if one is already buffered.
    pub fn try_next_written(&mut self) -> Option<Written> {
        self.written.try_recv().ok()
    }
}

/// A [`Connector`] that hands out one prepared in-memory connection.
pub struct MemoryConnector {
    connection: Mutex<Option<Connection>>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl MemoryConnector {
    /// Wrap a connection from [`pair`].
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// URLs and headers `open` was called with.
    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Connection, TransportError> {
        self.requests.lock().push((url.to_owned(), headers.to_vec()));
        self.connection
            .lock()
            .take()
            .ok_or_else(|| TransportError::Connect {
                url: url.to_owned(),
                reason: "connection already taken".into(),
            })
    }
}
