//! Event envelope and wire codec.
//!
//! Every frame on the connection is one JSON object:
//!
//! ```json
//! {"event": "server.message.updated", "params": {}, "confirm_id": "0191..."}
//! ```
//!
//! Inbound frames go through [`probe`] first, which reads only the kind and
//! the confirm id and skips over `params` without building it. The payload
//! is decoded later, and only if a listener asks for it, with [`decode`] or
//! [`decode_params`].

use bytes::Bytes;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CodecError;
use crate::ids::ConfirmId;
use crate::kinds;

/// A tagged unit of communication.
///
/// `P` is the kind-specific payload. Untyped events use [`serde_json::Value`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event<P = Value> {
    /// Event kind, e.g. `server.message.updated`.
    #[serde(rename = "event")]
    pub kind: String,
    /// Kind-specific payload.
    pub params: P,
    /// Correlation ID the receiver must echo back in a confirm event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_id: Option<ConfirmId>,
}

impl<P> Event<P> {
    /// Create an event with no correlation ID.
    pub fn new(kind: impl Into<String>, params: P) -> Self {
        Self {
            kind: kind.into(),
            params,
            confirm_id: None,
        }
    }

    /// Attach a correlation ID.
    #[must_use]
    pub fn with_confirm_id(mut self, id: ConfirmId) -> Self {
        self.confirm_id = Some(id);
        self
    }
}

impl Event<Value> {
    /// A `client.ping` carrying `id`.
    pub fn ping(id: ConfirmId) -> Self {
        Self::new(kinds::CLIENT_PING, Value::Object(serde_json::Map::new())).with_confirm_id(id)
    }
}

impl Event<ConfirmParams> {
    /// The acknowledgement for an inbound event that carried `id`.
    pub fn confirm(id: ConfirmId) -> Self {
        Self::new(kinds::CLIENT_CONFIRM, ConfirmParams { confirm_id: id })
    }
}

/// Params of `client.confirm` and `server.confirm`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmParams {
    /// The ID being acknowledged.
    pub confirm_id: ConfirmId,
}

/// The routing fields of an inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Event kind. Never empty.
    pub kind: String,
    /// Correlation ID, present only when the frame carried a non-empty string.
    pub confirm_id: Option<ConfirmId>,
}

#[derive(Deserialize)]
struct Probe {
    #[serde(default)]
    event: Option<Value>,
    #[serde(default)]
    confirm_id: Option<Value>,
}

#[derive(Deserialize)]
struct ParamsOnly<P> {
    params: Option<P>,
}

/// Serialize an event to a frame.
pub fn encode<P: Serialize>(event: &Event<P>) -> Result<Bytes, CodecError> {
    serde_json::to_vec(event)
        .map(Bytes::from)
        .map_err(|e| CodecError::Encode {
            kind: event.kind.clone(),
            reason: e.to_string(),
        })
}

/// Extract the kind and correlation ID from a frame.
///
/// A non-string `confirm_id` is treated as absent rather than as an error.
pub fn probe(frame: &[u8]) -> Result<FrameHeader, CodecError> {
    if !frame.trim_ascii_start().starts_with(b"{") {
        return match serde_json::from_slice::<IgnoredAny>(frame) {
            Ok(_) => Err(CodecError::NotAnObject),
            Err(e) => Err(CodecError::json(&e)),
        };
    }

    let probe: Probe = serde_json::from_slice(frame).map_err(|e| CodecError::json(&e))?;

    let kind = match probe.event {
        Some(Value::String(kind)) if !kind.is_empty() => kind,
        _ => return Err(CodecError::MissingKind),
    };
    let confirm_id = match probe.confirm_id {
        Some(Value::String(id)) if !id.is_empty() => Some(ConfirmId::from(id)),
        _ => None,
    };

    Ok(FrameHeader { kind, confirm_id })
}

/// Fully decode a frame into a typed event.
pub fn decode<P: DeserializeOwned>(frame: &[u8]) -> Result<Event<P>, CodecError> {
    serde_json::from_slice(frame).map_err(|e| CodecError::json(&e))
}

/// Decode only the `params` of a frame.
///
/// Missing or `null` params decode as if the payload were `null`, so
/// `Value`, `Option<T>` and `()` targets accept parameterless events.
pub fn decode_params<P: DeserializeOwned>(frame: &[u8]) -> Result<P, CodecError> {
    let wrapper: ParamsOnly<P> =
        serde_json::from_slice(frame).map_err(|e| CodecError::json(&e))?;
    match wrapper.params {
        Some(params) => Ok(params),
        None => P::deserialize(Value::Null).map_err(|e| CodecError::json(&e)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
