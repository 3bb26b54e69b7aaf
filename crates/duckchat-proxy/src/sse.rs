//! Event-stream framing shared by both sides of the proxy.
//!
//! Both the backend and the client stream use `data: <payload>` lines; only the
//! payload shapes differ. Lines are split on raw bytes before UTF-8 decoding so
//! a multi-byte character cut across two network chunks survives intact.

use serde::Serialize;

/// Prefix marking a data frame line.
pub const DATA_PREFIX: &str = "data: ";

/// Terminal sentinel of the client-facing stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Return the payload of a data frame line, or `None` for any other line.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

/// Encode `payload` as one `data: <json>\n\n` frame.
pub fn encode_frame<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{}{}\n\n", DATA_PREFIX, serde_json::to_string(payload)?))
}

/// Accumulates raw bytes and hands out complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the stream has ended, if non-empty.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.buf);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
