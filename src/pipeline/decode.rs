//! Streaming decoders (bytes -> lines -> frames)
//!
//! Everything here is transport independent: callers push whatever chunks the
//! socket hands them and pull complete frames back out. Accumulation is keyed
//! on logical lines, so the result never depends on where reads split.

use crate::Result;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use std::mem;

/// Payload that marks the end of an OpenAI-style stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

pub fn is_done_sentinel(payload: &str) -> bool {
    payload.trim() == DONE_SENTINEL
}

/// Reassembles `\n`-terminated lines from arbitrary byte chunks.
///
/// A trailing `\r` is stripped so CRLF streams decode like LF streams.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: BytesMut,
    // bytes already known to contain no '\n'
    scanned: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let rel = self.buf[self.scanned..].iter().position(|b| *b == b'\n');
        let Some(rel) = rel else {
            self.scanned = self.buf.len();
            return None;
        };
        let idx = self.scanned + rel;
        let mut line = self.buf.split_to(idx + 1);
        self.scanned = 0;
        line.truncate(idx);
        Some(decode_line(&line))
    }

    /// Hands out the final unterminated line at end of input, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        Some(decode_line(&rest))
    }

    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// The SSE framing rule as a line-driven state machine.
///
/// Idle while the buffer is empty, accumulating otherwise:
/// - `data:` lines append their trimmed remainder (newline-joined)
/// - a blank line completes a non-empty event
/// - every other line (`event:`, `id:`, `: comment`) is ignored
#[derive(Debug, Default)]
pub struct SseFrameParser {
    data: String,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one logical line; returns a payload when it completes an event.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(rest.trim());
            return None;
        }
        if line.is_empty() && !self.data.is_empty() {
            return Some(mem::take(&mut self.data));
        }
        None
    }

    /// End of input: a final event without its blank line is still delivered.
    pub fn finish(&mut self) -> Option<String> {
        if self.data.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.data))
        }
    }

    pub fn is_accumulating(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Bytes in, SSE payloads out.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: LineSplitter,
    parser: SseFrameParser,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.lines.push(chunk);
    }

    /// Next complete payload from the bytes pushed so far.
    pub fn next_event(&mut self) -> Option<String> {
        while let Some(line) = self.lines.next_line() {
            if let Some(event) = self.parser.push_line(&line) {
                return Some(event);
            }
        }
        None
    }

    /// Call once at end of input, after `next_event` has been drained.
    pub fn finish(&mut self) -> Option<String> {
        if let Some(line) = self.lines.finish() {
            if let Some(event) = self.parser.push_line(&line) {
                return Some(event);
            }
        }
        self.parser.finish()
    }
}

/// NDJSON / JSONL decoder (one JSON object per line, blank lines skipped).
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    lines: LineSplitter,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.lines.push(chunk);
    }

    pub fn next_item<T: DeserializeOwned>(&mut self) -> Option<Result<T>> {
        while let Some(line) = self.lines.next_line() {
            if let Some(item) = parse_line(&line) {
                return Some(item);
            }
        }
        None
    }

    pub fn finish<T: DeserializeOwned>(&mut self) -> Option<Result<T>> {
        self.lines.finish().and_then(|line| parse_line(&line))
    }
}

fn parse_line<T: DeserializeOwned>(line: &str) -> Option<Result<T>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line).map_err(crate::Error::Serialization))
}
