//! Envelope parsing: SSE event -> [`TextFrame`].
//!
//! Every event's data is a JSON envelope `{"event": ..., "data": ...}`. The
//! SSE `event:` line, when present, is used if the envelope omits the
//! discriminator.

use flashtalk_core::TextFrame;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FrameError;
use crate::sse::SseEvent;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Parse one SSE event.
///
/// Returns `Ok(None)` for discriminators this client does not know; the
/// caller logs and skips them.
pub fn parse_frame(sse: &SseEvent) -> Result<Option<TextFrame>, FrameError> {
    let envelope: Envelope =
        serde_json::from_str(&sse.data).map_err(|e| FrameError::InvalidJson {
            event: sse.event.clone(),
            reason: e.to_string(),
        })?;

    let event = envelope
        .event
        .or_else(|| sse.event.clone())
        .ok_or(FrameError::MissingEvent)?;

    let frame = match event.as_str() {
        "message" => TextFrame::Delta(string_payload(&event, envelope.data)?),
        "existing_content" => TextFrame::ExistingContent(content_payload(&event, envelope.data)?),
        "complete" => TextFrame::Complete(optional_content(&event, envelope.data)?),
        "error" => TextFrame::Error(error_reason(envelope.data)),
        _ => {
            tracing::debug!(event = %event, "Ignoring unknown frame");
            return Ok(None);
        }
    };
    Ok(Some(frame))
}

fn invalid(event: &str, reason: impl Into<String>) -> FrameError {
    FrameError::InvalidPayload {
        event: event.to_string(),
        reason: reason.into(),
    }
}

fn string_payload(event: &str, data: Value) -> Result<String, FrameError> {
    match data {
        Value::String(s) => Ok(s),
        other => Err(invalid(event, format!("expected string, got {other}"))),
    }
}

/// A string, or an object carrying a string `content`.
fn content_payload(event: &str, data: Value) -> Result<String, FrameError> {
    optional_content(event, data)?.ok_or_else(|| invalid(event, "missing content"))
}

fn optional_content(event: &str, data: Value) -> Result<Option<String>, FrameError> {
    match data {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Object(mut map) => match map.remove("content") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(invalid(event, format!("content must be a string, got {other}"))),
        },
        other => Err(invalid(event, format!("unexpected payload {other}"))),
    }
}

fn error_reason(data: Value) -> String {
    match data {
        Value::String(s) => s,
        Value::Object(map) => ["message", "error", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map_or_else(|| Value::Object(map.clone()).to_string(), str::to_string),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}
