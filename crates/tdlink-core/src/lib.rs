//! # tdlink-core
//!
//! Shared vocabulary for the tdlink client:
//!
//! - **Envelope codec**: [`Event`] and the [`encode`] / [`probe`] / [`decode`] trio
//! - **Reserved kinds**: control events the session reacts to ([`kinds`])
//! - **Confirm IDs**: [`ConfirmId`] correlation identifiers
//! - **Errors**: [`CodecError`]
//! - **Logging**: subscriber bootstrap and test capture ([`logging`])

#![deny(unsafe_code)]

pub mod errors;
pub mod event;
pub mod ids;
pub mod kinds;
pub mod logging;

pub use errors::CodecError;
pub use event::{ConfirmParams, Event, FrameHeader, decode, decode_params, encode, probe};
pub use ids::ConfirmId;
