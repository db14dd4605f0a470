//! Session facade.
//!
//! A [`Session`] owns one connection and the two tasks driving it: the
//! writer loop (sole owner of the write half) and the dispatcher loop (sole
//! owner of the read half). Callers interact only through the bounded
//! outbound queue, the listener registry, and the failure latch.
//!
//! Lifecycle: `Connecting → Open → Closing → Closed`, with `Failed`
//! reachable from `Open` at any time. Both `Closed` and `Failed` are
//! terminal and reported through the latch: every blocked wait is released
//! with the latched error, and every later call is rejected with it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tdlink_core::{ConfirmId, ConfirmParams, Event, encode, kinds};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::config::SessionConfig;
use crate::dispatch::dispatch_loop;
use crate::errors::SessionError;
use crate::inbound::InboundEvent;
use crate::latch::FailureLatch;
use crate::registry::{Delivery, KindFilter, ListenerGuard, ListenerId, ListenerRegistry};
use crate::transport::{Connection, Connector, WebSocketConnector};
use crate::writer::{Outbound, writer_loop};

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport handshake in progress.
    Connecting,
    /// Both loops running.
    Open,
    /// Close requested; waiting for the closure acknowledgement.
    Closing,
    /// Closed normally.
    Closed,
    /// Terminated by a fatal error.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        })
    }
}

/// State shared between the facade and both loops.
pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    pub(crate) registry: Arc<ListenerRegistry>,
    pub(crate) latch: FailureLatch,
    closing: AtomicBool,
    outbound: mpsc::Sender<Outbound>,
}

impl Shared {
    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Latch `err` and release every listener. Only the first call has effect.
    pub(crate) fn terminate(&self, err: SessionError) -> bool {
        if !self.latch.latch(err) {
            return false;
        }
        let released = self.registry.close_all();
        match self.latch.get() {
            Some(SessionError::AlreadyClosed) | None => {
                info!(released, state = %SessionState::Closed, "session closed");
            }
            Some(err) => {
                error!(error = %err, released, state = %SessionState::Failed, "session failed");
            }
        }
        true
    }

    fn state(&self) -> SessionState {
        match self.latch.get() {
            Some(SessionError::AlreadyClosed) => SessionState::Closed,
            Some(_) => SessionState::Failed,
            None if self.is_closing() => SessionState::Closing,
            None => SessionState::Open,
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if let Some(err) = self.latch.get() {
            return Err(err.clone());
        }
        if self.is_closing() {
            return Err(SessionError::AlreadyClosed);
        }
        Ok(())
    }

    /// Queue an item for the writer, waiting for capacity.
    pub(crate) async fn enqueue(&self, item: Outbound) -> Result<(), SessionError> {
        tokio::select! {
            biased;
            () = self.latch.cancelled() => Err(self.latch.error()),
            sent = self.outbound.send(item) => sent.map_err(|_| self.latch.error()),
        }
    }
}

struct LoopTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// A live event session.
///
/// Every method takes `&self`; share a session between tasks with `Arc`.
/// Dropping the session terminates it without a close handshake.
pub struct Session {
    shared: Arc<Shared>,
    tasks: AsyncMutex<Option<LoopTasks>>,
}

impl Session {
    /// Open a WebSocket connection to `config.url` and start the session.
    pub async fn connect(config: SessionConfig) -> Result<Self, SessionError> {
        Self::connect_with(&WebSocketConnector, config).await
    }

    /// Open a connection through `connector` and start the session.
    pub async fn connect_with(
        connector: &dyn Connector,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        debug!(url = %config.url, state = %SessionState::Connecting, "opening connection");
        let connection = connector.open(&config.url, &config.headers).await?;
        Ok(Self::start(connection, config))
    }

    /// Start a session over an already-open connection.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(connection: Connection, config: SessionConfig) -> Self {
        let (outbound, queue) = mpsc::channel(config.outbound_capacity.max(1));
        let registry = Arc::new(ListenerRegistry::new(config.delivery_timeout));
        let span = info_span!("session", url = %config.url);
        let shared = Arc::new(Shared {
            config,
            registry,
            latch: FailureLatch::new(),
            closing: AtomicBool::new(false),
            outbound,
        });

        let writer = tokio::spawn(
            writer_loop(Arc::clone(&shared), connection.sink, queue).instrument(span.clone()),
        );
        let reader =
            tokio::spawn(dispatch_loop(Arc::clone(&shared), connection.source).instrument(span));
        info!(url = %shared.config.url, state = %SessionState::Open, "session open");

        Self {
            shared,
            tasks: AsyncMutex::new(Some(LoopTasks { reader, writer })),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The fatal error, once the session has failed.
    pub fn failure(&self) -> Option<SessionError> {
        self.shared
            .latch
            .get()
            .filter(|err| **err != SessionError::AlreadyClosed)
            .cloned()
    }

    /// Wait until the session terminates and return why.
    pub async fn terminated(&self) -> SessionError {
        self.shared.latch.wait().await
    }

    /// The configuration this session runs with.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Number of registered waiters and subscriptions.
    pub fn listener_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Encode `event` and hand it to the writer loop.
    ///
    /// Rejected immediately once the session is closing or terminated.
    /// Success means the frame was queued, not that the peer received it;
    /// write failures surface through the latch.
    pub async fn send<P: Serialize + Sync>(&self, event: &Event<P>) -> Result<(), SessionError> {
        self.shared.ensure_open()?;
        let frame = encode(event)?;
        debug!(kind = %event.kind, bytes = frame.len(), "event queued");
        self.shared.enqueue(Outbound::Frame(frame)).await
    }

    /// Queue a pre-encoded frame.
    pub async fn send_raw(&self, frame: Bytes) -> Result<(), SessionError> {
        self.shared.ensure_open()?;
        self.shared.enqueue(Outbound::Frame(frame)).await
    }

    /// Wait for the next event of `kind` (the empty string matches any kind).
    ///
    /// Exactly one of three things happens: a matching event arrives, the
    /// timeout elapses, or the session terminates. Termination wins over a
    /// simultaneous timeout. The waiter is deregistered before returning.
    pub async fn wait_for(
        &self,
        kind: &str,
        timeout: Duration,
    ) -> Result<InboundEvent, SessionError> {
        self.shared.ensure_open()?;
        let (guard, mut rx) = self
            .shared
            .registry
            .register(KindFilter::kind(kind), Delivery::Once, 1)
            .ok_or_else(|| self.shared.latch.error())?;

        let outcome = tokio::select! {
            biased;
            event = rx.recv() => event.ok_or_else(|| self.shared.latch.error()),
            err = self.shared.latch.wait() => Err(err),
            () = tokio::time::sleep(timeout) => Err(SessionError::timeout(kind, timeout)),
        };
        drop(guard);

        if let Err(err) = &outcome {
            trace!(kind, error = %err, "wait ended without event");
        }
        outcome
    }

    /// [`wait_for`](Self::wait_for), then decode the params as `P`.
    pub async fn wait_for_params<P: DeserializeOwned>(
        &self,
        kind: &str,
        timeout: Duration,
    ) -> Result<P, SessionError> {
        Ok(self.wait_for(kind, timeout).await?.params()?)
    }

    /// Receive every event passing `filter` until the subscription drops.
    pub fn subscribe(&self, filter: KindFilter) -> Result<Subscription, SessionError> {
        self.shared.ensure_open()?;
        let (guard, rx) = self
            .shared
            .registry
            .register(
                filter.clone(),
                Delivery::Stream,
                self.shared.config.subscription_capacity,
            )
            .ok_or_else(|| self.shared.latch.error())?;
        debug!(%filter, listener = ?guard.id(), "subscription opened");
        Ok(Subscription {
            shared: Arc::clone(&self.shared),
            rx,
            guard,
        })
    }

    /// Send a `client.ping` and wait for the server to confirm it.
    pub async fn ping(&self, timeout: Duration) -> Result<ConfirmId, SessionError> {
        let id = ConfirmId::new();
        self.round_trip(&Event::ping(id.clone()), &id, timeout)
            .await?;
        Ok(id)
    }

    /// Send `event` with a fresh confirm ID and wait for the server to confirm it.
    pub async fn send_confirmed<P: Serialize + Sync>(
        &self,
        event: Event<P>,
        timeout: Duration,
    ) -> Result<ConfirmId, SessionError> {
        let id = ConfirmId::new();
        let event = event.with_confirm_id(id.clone());
        self.round_trip(&event, &id, timeout).await?;
        Ok(id)
    }

    async fn round_trip<P: Serialize + Sync>(
        &self,
        event: &Event<P>,
        id: &ConfirmId,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        // Subscribe first so a fast confirm is not missed
        let mut confirms = self.subscribe(KindFilter::kind(kinds::SERVER_CONFIRM))?;
        self.send(event).await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let confirm = tokio::time::timeout_at(deadline, confirms.recv())
                .await
                .map_err(|_| SessionError::timeout(kinds::SERVER_CONFIRM, timeout))??;
            match confirm.params::<ConfirmParams>() {
                Ok(params) if params.confirm_id == *id => return Ok(()),
                Ok(params) => trace!(confirm_id = %params.confirm_id, "confirm for another request"),
                Err(err) => debug!(error = %err, "unreadable server confirm"),
            }
        }
    }

    /// Close the session.
    ///
    /// Sends a normal-closure frame behind everything already queued and
    /// waits up to `close_grace` for the peer's acknowledgement, then
    /// terminates. Returns once both loops have stopped. Idempotent and safe
    /// to call concurrently.
    pub async fn close(&self) {
        let mut tasks = self.tasks.lock().await;
        let Some(LoopTasks { reader, writer }) = tasks.take() else {
            return;
        };

        if !self.shared.latch.is_latched() {
            self.shared.closing.store(true, Ordering::Release);
            info!(state = %SessionState::Closing, "closing session");

            let grace = self.shared.config.close_grace;
            let handshake = async {
                if self.shared.enqueue(Outbound::Close).await.is_ok() {
                    self.shared.latch.cancelled().await;
                }
            };
            if tokio::time::timeout(grace, handshake).await.is_err() {
                warn!(
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    "no closure acknowledgement within grace period"
                );
            }
            let _ = self.shared.terminate(SessionError::AlreadyClosed);
        }

        for (task, handle) in [("reader", reader), ("writer", writer)] {
            match handle.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!(task, error = %err, "session task panicked"),
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.shared.terminate(SessionError::AlreadyClosed);
        if let Some(tasks) = self.tasks.get_mut().take() {
            tasks.reader.abort();
            tasks.writer.abort();
        }
    }
}

/// A standing listener created by [`Session::subscribe`].
///
/// Buffered events are still returned after the session terminates; once
/// drained, [`recv`](Self::recv) yields the latched error.
pub struct Subscription {
    shared: Arc<Shared>,
    rx: mpsc::Receiver<InboundEvent>,
    guard: ListenerGuard,
}

impl Subscription {
    /// Next matching event, or the termination error.
    pub async fn recv(&mut self) -> Result<InboundEvent, SessionError> {
        tokio::select! {
            biased;
            event = self.rx.recv() => event.ok_or_else(|| self.shared.latch.error()),
            err = self.shared.latch.wait() => Err(err),
        }
    }

    /// Registry handle of this subscription.
    pub fn id(&self) -> ListenerId {
        self.guard.id()
    }
}
