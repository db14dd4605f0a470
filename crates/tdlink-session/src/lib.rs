//! # tdlink-session
//!
//! Client runtime for one persistent, event-based WebSocket connection.
//!
//! A [`Session`] multiplexes server-pushed events to any number of
//! in-process waiters, acknowledges every inbound `confirm_id`, correlates
//! confirmed sends with their replies, and reports connection failure to
//! every pending operation exactly once.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tdlink_session::SessionError> {
//! use std::time::Duration;
//! use tdlink_session::{Session, SessionConfig};
//!
//! let session = Session::connect(SessionConfig::new("ws://127.0.0.1:8080/messaging/acme")).await?;
//! let online = session.wait_for("server.online", Duration::from_secs(5)).await?;
//! println!("{}", online.kind());
//! session.close().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
mod dispatch;
pub mod endpoint;
pub mod errors;
pub mod inbound;
mod latch;
pub mod registry;
mod session;
pub mod transport;
mod writer;

pub use config::SessionConfig;
pub use endpoint::{EndpointError, messaging_url};
pub use errors::{SessionError, TransportError};
pub use inbound::InboundEvent;
pub use registry::{KindFilter, ListenerId};
pub use session::{Session, SessionState, Subscription};
pub use tdlink_settings::MalformedFramePolicy;
