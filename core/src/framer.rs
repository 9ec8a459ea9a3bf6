//! Line framing for the IRC byte stream
//!
//! Reassembles the raw bytes of a connection into complete protocol lines.
//! A line ends at `\r\n`, a lone `\n` or a lone `\r`; empty lines are
//! dropped. Payloads are capped at 510 bytes; anything past the cap is
//! discarded up to the next terminator.

use std::collections::VecDeque;

/// Maximum line length in bytes, terminator included
pub const MAX_LINE_BYTES: usize = 512;

/// Maximum payload bytes per line (terminator excluded)
pub const MAX_PAYLOAD_BYTES: usize = MAX_LINE_BYTES - 2;

/// Per-connection line reassembly buffer
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes of the line currently being assembled (never contains a terminator)
    pending: Vec<u8>,
    /// Complete lines ready to be consumed
    complete: VecDeque<Vec<u8>>,
    /// Set while discarding the tail of an over-long line
    overflowed: bool,
}

impl LineFramer {
    /// Create a new, empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the socket into the framer.
    ///
    /// A `\r\n` pair acts as a single terminator: the `\r` completes the
    /// line and the following `\n` then terminates an empty line, which is
    /// skipped. The same holds for any run of terminator bytes.
    pub fn push(&mut self, data: &[u8]) {
        for &byte in data {
            match byte {
                b'\r' | b'\n' => {
                    self.overflowed = false;
                    let line = std::mem::take(&mut self.pending);
                    if !line.is_empty() {
                        self.complete.push_back(line);
                    }
                }
                _ if self.overflowed => {}
                _ if self.pending.len() < MAX_PAYLOAD_BYTES => {
                    self.pending.push(byte);
                }
                _ => {
                    self.overflowed = true;
                }
            }
        }
    }

    /// Pop the next complete line, if any
    pub fn next_line(&mut self) -> Option<String> {
        self.complete
            .pop_front()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Number of buffered bytes that do not yet form a complete line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
