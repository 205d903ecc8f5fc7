//! Accumulating buffer for inbound bytes.
//!
//! TCP hands the handler arbitrary fragments; the buffer stitches them back
//! together and only gives out whole lines or whole fixed-size slices. A
//! partial line or an incomplete slice stays buffered until more bytes arrive.

use bytes::{Bytes, BytesMut};

/// Inbound byte accumulator with line and fixed-length slicing.
#[derive(Debug, Default)]
pub struct ByteStreamBuffer {
    inner: BytesMut,
}

impl ByteStreamBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    /// Create an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        ByteStreamBuffer {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Append a delivery
    pub fn append(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// Buffered byte count
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Buffered bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Length of the next line including its terminator (`\n` or `\r\n`),
    /// or `None` if no terminator has arrived yet.
    pub fn line_len(&self) -> Option<usize> {
        self.inner.iter().position(|&b| b == b'\n').map(|pos| pos + 1)
    }

    /// Take the next line, terminator included.
    ///
    /// Returns `None` without consuming anything when the line is incomplete.
    pub fn take_line(&mut self) -> Option<Bytes> {
        let len = self.line_len()?;
        Some(self.inner.split_to(len).freeze())
    }

    /// Look at the first `n` bytes without consuming them
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        self.inner.get(..n)
    }

    /// Take exactly `n` bytes, or nothing if fewer are buffered
    pub fn take_exact(&mut self, n: usize) -> Option<Bytes> {
        if self.inner.len() < n {
            return None;
        }
        Some(self.inner.split_to(n).freeze())
    }

    /// Take everything buffered
    pub fn take_all(&mut self) -> Bytes {
        self.inner.split().freeze()
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Strip a trailing `\n` or `\r\n` from a line.
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
