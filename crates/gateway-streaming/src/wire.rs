//! Text framing of stream events for consumers that forward them as SSE
//! `data:` payloads.

use gateway_core::{StreamEvent, StreamFailure};
use serde_json::json;

/// Payload of a heartbeat frame
pub const HEARTBEAT_SENTINEL: &str = ":heartbeat";

/// Payload of the final frame of a successful stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    /// Text delta
    Content(String),
    /// Keep-alive
    Heartbeat,
    /// Successful end
    Done,
    /// Failed end
    Error(StreamFailure),
}

/// Encode an event as a frame payload.
///
/// Errors become `{"error": {"type": .., "message": ..}}` carrying only the
/// display-safe message.
#[must_use]
pub fn encode(event: &StreamEvent) -> String {
    match event {
        StreamEvent::ContentDelta(text) => text.clone(),
        StreamEvent::Heartbeat => HEARTBEAT_SENTINEL.to_string(),
        StreamEvent::Complete(_) => DONE_SENTINEL.to_string(),
        StreamEvent::Error(failure) => json!({
            "error": {
                "type": failure.error_type,
                "message": failure.message,
            }
        })
        .to_string(),
    }
}

/// Decode a frame payload
#[must_use]
pub fn decode(frame: &str) -> WireFrame {
    if is_heartbeat(frame) {
        return WireFrame::Heartbeat;
    }
    if is_done(frame) {
        return WireFrame::Done;
    }
    if frame.starts_with("{\"error\"") {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(frame) {
            if let Some(error) = value.get("error") {
                if let Ok(failure) = serde_json::from_value::<StreamFailure>(error.clone()) {
                    return WireFrame::Error(failure);
                }
            }
        }
    }
    WireFrame::Content(frame.to_string())
}

/// Whether a frame payload is a heartbeat
#[must_use]
pub fn is_heartbeat(frame: &str) -> bool {
    frame.trim() == HEARTBEAT_SENTINEL
}

/// Whether a frame payload marks completion
#[must_use]
pub fn is_done(frame: &str) -> bool {
    frame.trim() == DONE_SENTINEL
}
