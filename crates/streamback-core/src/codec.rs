//! Frame encoding and decoding.
//!
//! Encoding: `data: <json array><separator>\n\n`. Decoding works on the
//! concatenated `data` payloads the client transport accumulates: split on the
//! separator, drop the trailing empty fragment, parse each fragment.

use bytes::Bytes;

use crate::error::{Result, StreamError};
use crate::protocol::{Frame, STREAM_SEPARATOR, ServerSentEvent};

/// Encode one frame as a complete event-stream record.
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let json = serde_json::to_string(frame)?;
    let event = ServerSentEvent::new(format!("{json}{STREAM_SEPARATOR}"));
    Ok(Bytes::from(event.encode()))
}

/// Split a concatenated message into frame fragments.
pub fn split_fragments(message: &str) -> Vec<&str> {
    let mut fragments: Vec<&str> = message.split(STREAM_SEPARATOR).collect();
    if fragments.last() == Some(&"") {
        fragments.pop();
    }
    fragments
}

/// Parse a single fragment.
pub fn decode_fragment(fragment: &str) -> Result<Frame> {
    serde_json::from_str(fragment)
        .map_err(|e| StreamError::Codec(format!("malformed frame {fragment:?}: {e}")))
}

/// Decode every fragment of a concatenated message, keeping per-fragment failures.
pub fn decode_message(message: &str) -> Vec<Result<Frame>> {
    split_fragments(message).into_iter().map(decode_fragment).collect()
}

/// Inverse of [`encode_frame`] for a single record.
pub fn decode_record(record: &[u8]) -> Result<Frame> {
    let text = std::str::from_utf8(record).map_err(|e| StreamError::Codec(e.to_string()))?;
    let data = text
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .ok_or_else(|| StreamError::Codec(format!("not a data record: {text:?}")))?;
    let mut frames = decode_message(data);
    match (frames.len(), frames.pop()) {
        (1, Some(frame)) => frame,
        (n, _) => Err(StreamError::Codec(format!("expected one frame per record, found {n}"))),
    }
}

/// A parsed event-stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental event-stream parser. Feed raw transport bytes, get complete events.
///
/// Partial lines (including split UTF-8 sequences) are buffered until the
/// rest arrives.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_id: Option<String>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');

            if line.is_empty() {
                // Empty line = dispatch event
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = line.strip_prefix("event:") {
                self.current_event = Some(strip_space(value).to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.current_data.push(strip_space(value).to_string());
            } else if let Some(value) = line.strip_prefix("id:") {
                self.current_id = Some(strip_space(value).to_string());
            }
        }

        events
    }

    /// Flush whatever is pending once the transport has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        // `push` drains every complete line, so only an unterminated one can remain.
        let tail = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&tail);
        if let Some(value) = line.trim_end_matches('\r').strip_prefix("data:") {
            self.current_data.push(strip_space(value).to_string());
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            id: self.current_id.take(),
        };
        self.current_data.clear();
        Some(event)
    }
}

fn strip_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}
