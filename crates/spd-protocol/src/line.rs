//! Streaming line reassembly
//!
//! The instrument's wire protocol is ASCII text, one line feed per message.
//! Reads from the device arrive in arbitrary chunks, so complete lines must
//! be reassembled across read calls.

/// Longest line the codec will buffer before clamping
const MAX_LINE_LEN: usize = 4096;

/// Streaming SCPI line codec
///
/// Bytes go in via [`push_bytes`](LineCodec::push_bytes); complete lines come
/// out via [`next_line`](LineCodec::next_line). Invalid bytes are decoded
/// lossily (replacement character) rather than rejected, and blank lines are
/// swallowed — the instrument pads some replies with bare terminators.
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new codec with an empty buffer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent unbounded growth if the device never terminates a line
        if self.buffer.len() > MAX_LINE_LEN * 4 {
            tracing::warn!(
                "Discarding {} unterminated bytes",
                self.buffer.len() - MAX_LINE_LEN
            );
            let start = self.buffer.len() - MAX_LINE_LEN;
            self.buffer = self.buffer[start..].to_vec();
        }
    }

    /// Extract the next complete, non-empty line
    ///
    /// Returns `None` when no full line is buffered. Trailing carriage
    /// returns and surrounding whitespace are stripped.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == b'\n')?;
            let line_bytes: Vec<u8> = self.buffer.drain(..=term_pos).collect();

            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1])
                .trim()
                .to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }

    /// Number of bytes currently buffered without a terminator
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
