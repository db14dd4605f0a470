//! Write-once session termination.
//!
//! The first writer wins: its error is stored and the cancellation token is
//! fired, which wakes every task selecting on [`FailureLatch::cancelled`] at
//! once. Later writes are ignored.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::errors::SessionError;

pub(crate) struct FailureLatch {
    slot: OnceLock<SessionError>,
    token: CancellationToken,
}

impl FailureLatch {
    pub(crate) fn new() -> Self {
        Self {
            slot: OnceLock::new(),
            token: CancellationToken::new(),
        }
    }

    /// Store `err` if nothing is latched yet. Returns whether this call won.
    pub(crate) fn latch(&self, err: SessionError) -> bool {
        let first = self.slot.set(err).is_ok();
        // slot is written before the token fires, so woken readers see it
        self.token.cancel();
        first
    }

    pub(crate) fn get(&self) -> Option<&SessionError> {
        self.slot.get()
    }

    pub(crate) fn is_latched(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The latched error, or `AlreadyClosed` if none.
    pub(crate) fn error(&self) -> SessionError {
        self.get().cloned().unwrap_or(SessionError::AlreadyClosed)
    }

    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Wait for termination and return the latched error.
    pub(crate) async fn wait(&self) -> SessionError {
        self.token.cancelled().await;
        self.error()
    }
}
