//! Minimal server-sent-events framing over a streamed response body.

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use gateway_core::{GatewayError, ProviderKind};
use reqwest::Response;
use std::time::Duration;

/// One SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// `event:` field, if present
    pub event: Option<String>,
    /// Joined `data:` lines
    pub data: String,
}

/// Incremental SSE decoder.
///
/// Bytes are buffered until a blank line closes an event, so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&raw[..pos])) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing event that was not closed by a blank line
    #[must_use]
    pub fn finish(self) -> Option<SseFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        parse_frame(&String::from_utf8_lossy(&self.buffer))
    }
}

fn parse_frame(block: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => frame.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() && frame.event.is_none() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

/// Decode a streamed response body into SSE frames.
pub fn frames(
    provider: ProviderKind,
    timeout: Duration,
    response: Response,
) -> BoxStream<'static, Result<SseFrame, GatewayError>> {
    let stream = try_stream! {
        let mut byte_stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| crate::http::map_transport_error(provider, timeout, &e))?;
            for frame in decoder.push(&chunk) {
                yield frame;
            }
        }

        if let Some(frame) = decoder.finish() {
            yield frame;
        }
    };
    Box::pin(stream)
}
