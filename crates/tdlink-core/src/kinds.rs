//! Reserved event kinds.
//!
//! The session inspects these kinds itself. All other kinds are opaque and
//! only routed to listeners.

/// Client keepalive; the server answers with [`SERVER_CONFIRM`].
pub const CLIENT_PING: &str = "client.ping";

/// Acknowledgement of an inbound event that carried a `confirm_id`.
pub const CLIENT_CONFIRM: &str = "client.confirm";

/// Server acknowledgement of a client event that carried a `confirm_id`.
pub const SERVER_CONFIRM: &str = "server.confirm";

/// Non-fatal server notice. Logged and routed like any other event.
pub const SERVER_WARNING: &str = "server.warning";

/// Fatal server fault. Terminates the session.
pub const SERVER_ABORT: &str = "server.abort";
