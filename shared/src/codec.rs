//! Newline framing for the text protocol
//!
//! TCP delivers an unstructured byte stream, so every connection keeps a
//! [`LineBuffer`] that accumulates partial reads until a full line is
//! available. Framing knows nothing about message semantics: it yields raw
//! text lines which the protocol layer parses afterwards.

use crate::error::TransportError;
use std::fmt::Display;
use std::io;

/// Bytes requested from the socket per poll.
pub const READ_CHUNK: usize = 4096;

/// Longest line accepted. A longer line is dropped whole, up to and including
/// its terminator.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Per-connection accumulator for partial lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes and returns every line they complete, in order.
    ///
    /// Returned lines have the terminator and surrounding whitespace removed.
    /// Blank lines are dropped, and so is any line longer than [`MAX_LINE_LEN`].
    pub fn extend(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let (segment, terminated) = match rest.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let segment = &rest[..pos];
                    rest = &rest[pos + 1..];
                    (segment, true)
                }
                None => (std::mem::take(&mut rest), false),
            };

            if self.discarding {
                self.discarding = !terminated;
                continue;
            }

            self.pending.extend_from_slice(segment);
            if self.pending.len() > MAX_LINE_LEN {
                self.pending.clear();
                self.discarding = !terminated;
                continue;
            }

            if terminated {
                let raw = std::mem::take(&mut self.pending);
                let line = decode_lossy(&raw);
                let line = line.trim();
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
            }
        }

        lines
    }

    /// Performs one non-blocking read through `read` and frames the result.
    ///
    /// `read` behaves like a non-blocking socket read: `Ok(0)` means the peer
    /// closed the stream, `WouldBlock` means nothing is available right now
    /// and yields no lines.
    pub fn poll<F>(&mut self, mut read: F) -> Result<Vec<String>, TransportError>
    where
        F: FnMut(&mut [u8]) -> io::Result<usize>,
    {
        let mut chunk = [0u8; READ_CHUNK];
        match read(&mut chunk) {
            Ok(0) => Err(TransportError::PeerClosed),
            Ok(n) => Ok(self.extend(&chunk[..n])),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Vec::new()),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Renders a message as exactly one wire line, terminator included.
///
/// Embedded line breaks are flattened to spaces so a single message can
/// never be split into two lines on the receiving side.
pub fn encode_line<M: Display + ?Sized>(message: &M) -> String {
    let mut line: String = message
        .to_string()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    line.push('\n');
    line
}

/// Decodes UTF-8, silently dropping invalid byte sequences.
fn decode_lossy(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(bad) => bytes = &rest[bad..],
                    None => return out,
                }
            }
        }
    }
}
