//! Codec error types.

use thiserror::Error;

/// Errors produced while encoding or inspecting event frames.
///
/// Variants carry rendered messages rather than the source error so the
/// value can be cloned into a latched session failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The frame is not valid JSON, or params did not match the requested type.
    #[error("invalid event JSON: {0}")]
    Json(String),
    /// The frame is valid JSON but not an object.
    #[error("event frame is not a JSON object")]
    NotAnObject,
    /// The `event` field is missing, empty, or not a string.
    #[error("event frame has no kind")]
    MissingKind,
    /// An outbound event could not be serialized.
    #[error("failed to encode event {kind}: {reason}")]
    Encode {
        /// Kind of the event being encoded.
        kind: String,
        /// Serializer message.
        reason: String,
    },
}

impl CodecError {
    pub(crate) fn json(err: &serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
