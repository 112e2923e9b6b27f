use serde_json::Value;
use tracing::{debug, warn};

use crate::frame::Frame;

const DATA_PREFIX: &str = "data:";
const EVENT_PREFIX: &str = "event:";
const DONE_EVENT: &str = "done";
const DONE_PAYLOAD: &str = "[DONE]";

/// Incremental decoder for the newline-delimited `data:` record stream.
///
/// Bytes are buffered until a full line is present, so neither a record nor a
/// multi-byte character split across reads is ever parsed early. Exactly one
/// frame is produced per complete well-formed record, in transport order.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
    pending_event: Option<String>,
    malformed: usize,
}

impl FrameReader {
    /// Feed arbitrary bytes and drain every frame completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if let Some(frame) = self.decode_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Decode a complete payload in one shot; a trailing unterminated line is ignored.
    pub fn parse_frames(input: &str) -> Vec<Frame> {
        let mut reader = Self::default();
        reader.feed(input.as_bytes())
    }

    /// Discards any unterminated trailing record once the transport has ended.
    ///
    /// Returns the number of bytes that were dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        if dropped > 0 {
            debug!(bytes = dropped, "discarding unterminated trailing record at end of stream");
        }
        self.buffer.clear();
        self.pending_event = None;
        dropped
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    /// Count of records dropped because they were not decodable.
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<Frame> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(error) => {
                self.malformed += 1;
                warn!(%error, "dropping record with invalid UTF-8");
                return None;
            }
        };

        if line.trim().is_empty() {
            self.pending_event = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            self.pending_event = Some(name.trim().to_owned());
            return None;
        }

        let Some(payload) = line.strip_prefix(DATA_PREFIX).map(str::trim) else {
            debug!(line, "ignoring non-data stream line");
            return None;
        };

        if self.pending_event.as_deref() == Some(DONE_EVENT) || payload == DONE_PAYLOAD {
            return Some(Frame::Done);
        }
        if payload.is_empty() {
            return None;
        }

        let value = match serde_json::from_str::<Value>(payload) {
            Ok(value) => value,
            Err(error) => {
                self.malformed += 1;
                warn!(%error, record = truncate_for_log(payload), "dropping malformed record");
                return None;
            }
        };

        match Frame::decode(&value) {
            Ok(frame) => Some(frame),
            Err(error) => {
                self.malformed += 1;
                warn!(%error, record = truncate_for_log(payload), "dropping undecodable record");
                None
            }
        }
    }
}

fn truncate_for_log(payload: &str) -> &str {
    const LIMIT: usize = 200;
    if payload.len() <= LIMIT {
        return payload;
    }
    let mut end = LIMIT;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    &payload[..end]
}
