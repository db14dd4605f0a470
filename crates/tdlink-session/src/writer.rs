//! Outbound queue and writer loop.
//!
//! Producers enqueue into a bounded `mpsc` channel; one writer task owns the
//! transport's write half and drains it in FIFO order. A full queue applies
//! backpressure to producers. Any write error or missed deadline is latched
//! as a session failure and ends the loop.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::errors::{SessionError, TransportError};
use crate::session::Shared;
use crate::transport::FrameSink;

/// Reason text sent with the normal-closure frame.
pub(crate) const CLOSE_REASON: &str = "tdlink closing";

/// One queued item.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// An encoded event.
    Frame(Bytes),
    /// The normal-closure frame. Nothing is written after it.
    Close,
}

pub(crate) async fn writer_loop(
    shared: Arc<Shared>,
    mut sink: Box<dyn FrameSink>,
    mut queue: mpsc::Receiver<Outbound>,
) {
    let write_timeout = shared.config.write_timeout;
    let timeout_ms = u64::try_from(write_timeout.as_millis()).unwrap_or(u64::MAX);

    loop {
        let item = tokio::select! {
            biased;
            () = shared.latch.cancelled() => break,
            item = queue.recv() => item,
        };
        let Some(item) = item else { break };

        match item {
            Outbound::Frame(frame) => {
                let len = frame.len();
                let written = tokio::select! {
                    biased;
                    () = shared.latch.cancelled() => break,
                    written = tokio::time::timeout(write_timeout, sink.write_frame(frame)) => written,
                };
                match written {
                    Ok(Ok(())) => trace!(bytes = len, "frame written"),
                    Ok(Err(err)) => {
                        let _ = shared.terminate(SessionError::Transport(err));
                        break;
                    }
                    Err(_) => {
                        let _ = shared.terminate(TransportError::WriteTimeout { timeout_ms }.into());
                        break;
                    }
                }
            }
            Outbound::Close => {
                let closed = tokio::select! {
                    biased;
                    () = shared.latch.cancelled() => break,
                    closed = tokio::time::timeout(write_timeout, sink.close_normally(CLOSE_REASON)) => closed,
                };
                match closed {
                    Ok(Ok(())) => debug!("close frame sent"),
                    Ok(Err(err)) => {
                        debug!(error = %err, "close frame not sent");
                        let _ = shared.terminate(SessionError::AlreadyClosed);
                    }
                    Err(_) => {
                        debug!(timeout_ms, "close frame write timed out");
                        let _ = shared.terminate(SessionError::AlreadyClosed);
                    }
                }
                break;
            }
        }
    }

    // Refuse further enqueues; anything still buffered is discarded
    queue.close();
    debug!("writer loop stopped");
}
