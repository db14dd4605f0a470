//! Inbound dispatcher loop.
//!
//! The only reader of the transport. Per frame it probes the routing fields,
//! acknowledges a `confirm_id` through the outbound queue before moving on,
//! reacts to reserved control kinds, and fans the event out through the
//! listener registry. It ends when the connection closes or the session
//! latches a failure.

use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tdlink_core::{ConfirmId, Event, decode_params, encode, kinds, probe};
use tdlink_settings::MalformedFramePolicy;
use tracing::{debug, trace, warn};

use crate::errors::SessionError;
use crate::inbound::InboundEvent;
use crate::session::Shared;
use crate::transport::FrameSource;
use crate::writer::Outbound;

pub(crate) async fn dispatch_loop(shared: Arc<Shared>, mut source: Box<dyn FrameSource>) {
    loop {
        let read = tokio::select! {
            biased;
            () = shared.latch.cancelled() => break,
            read = source.read_frame() => read,
        };

        let frame = match read {
            Ok(frame) => frame,
            Err(err) => {
                if err.is_normal_closure() || (shared.is_closing() && err.is_closed()) {
                    debug!(error = %err, "connection closed");
                    let _ = shared.terminate(SessionError::AlreadyClosed);
                } else {
                    let _ = shared.terminate(SessionError::Transport(err));
                }
                break;
            }
        };

        let flow = tokio::select! {
            biased;
            () = shared.latch.cancelled() => break,
            flow = handle_frame(&shared, frame) => flow,
        };
        if flow.is_break() {
            break;
        }
    }
    debug!("dispatch loop stopped");
}

async fn handle_frame(shared: &Shared, frame: Bytes) -> ControlFlow<()> {
    let header = match probe(&frame) {
        Ok(header) => header,
        Err(err) => {
            return match shared.config.malformed_frames {
                MalformedFramePolicy::Skip => {
                    warn!(error = %err, bytes = frame.len(), "skipping malformed frame");
                    ControlFlow::Continue(())
                }
                MalformedFramePolicy::Fail => {
                    let _ = shared.terminate(SessionError::MalformedFrame(err));
                    ControlFlow::Break(())
                }
            };
        }
    };
    debug!(
        kind = %header.kind,
        confirm_id = header.confirm_id.as_deref(),
        bytes = frame.len(),
        "event received"
    );

    if let Some(id) = &header.confirm_id {
        acknowledge(shared, id).await;
    }

    match header.kind.as_str() {
        kinds::SERVER_WARNING => {
            warn!(params = %params_text(&frame), "server warning");
        }
        kinds::SERVER_ABORT => {
            let reason = abort_reason(&frame);
            let _ = shared.terminate(SessionError::ServerAbort { reason });
            return ControlFlow::Break(());
        }
        _ => {}
    }

    let event = InboundEvent::new(header, frame);
    let delivered = shared.registry.dispatch(&event).await;
    trace!(kind = event.kind(), delivered, "event dispatched");
    ControlFlow::Continue(())
}

async fn acknowledge(shared: &Shared, id: &ConfirmId) {
    let ack = match encode(&Event::confirm(id.clone())) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(confirm_id = %id, error = %err, "failed to encode acknowledgement");
            return;
        }
    };
    if let Err(err) = shared.enqueue(Outbound::Frame(ack)).await {
        debug!(confirm_id = %id, error = %err, "acknowledgement not queued");
    }
}

fn params_text(frame: &[u8]) -> String {
    decode_params::<Value>(frame).map_or_else(|_| String::new(), |v| v.to_string())
}

fn abort_reason(frame: &[u8]) -> String {
    match decode_params::<Value>(frame) {
        Ok(Value::Object(params)) => {
            if let Some(Value::String(reason)) = params.get("reason") {
                return reason.clone();
            }
            Value::Object(params).to_string()
        }
        Ok(Value::Null) | Err(_) => "no reason given".to_owned(),
        Ok(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reason_prefers_reason_field() {
        let frame = br#"{"event":"server.abort","params":{"reason":"maintenance","code":3}}"#;
        assert_eq!(abort_reason(frame), "maintenance");
    }

    #[test]
    fn abort_reason_falls_back_to_params() {
        let frame = br#"{"event":"server.abort","params":{"code":3}}"#;
        assert_eq!(abort_reason(frame), r#"{"code":3}"#);
        let frame = br#"{"event":"server.abort","params":"bye"}"#;
        assert_eq!(abort_reason(frame), r#""bye""#);
        assert_eq!(abort_reason(br#"{"event":"server.abort"}"#), "no reason given");
    }

    #[test]
    fn warning_params_rendered() {
        let frame = br#"{"event":"server.warning","params":{"message":"slow down"}}"#;
        assert_eq!(params_text(frame), r#"{"message":"slow down"}"#);
    }
}
