//! Inbound events as delivered to listeners.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tdlink_core::{CodecError, ConfirmId, Event, FrameHeader, decode, decode_params};

/// One routed inbound frame.
///
/// Only the kind and confirm ID have been parsed. Cloning is cheap; every
/// listener that matches gets its own copy sharing the raw bytes.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    kind: Arc<str>,
    confirm_id: Option<ConfirmId>,
    raw: Bytes,
}

impl InboundEvent {
    /// Pair a probed header with the frame it came from.
    pub fn new(header: FrameHeader, raw: Bytes) -> Self {
        Self {
            kind: header.kind.into(),
            confirm_id: header.confirm_id,
            raw,
        }
    }

    /// Event kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Correlation ID the frame carried, if any.
    pub fn confirm_id(&self) -> Option<&ConfirmId> {
        self.confirm_id.as_ref()
    }

    /// The undecoded frame.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Decode the payload.
    pub fn params<P: DeserializeOwned>(&self) -> Result<P, CodecError> {
        decode_params(&self.raw)
    }

    /// Decode the whole envelope.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<Event<P>, CodecError> {
        decode(&self.raw)
    }
}
