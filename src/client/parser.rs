//! Incremental HTTP/1.1 response decoder.
//!
//! State-machine parser over a [`ByteStreamBuffer`]. TCP gives no message
//! boundaries, so every call works with whatever has arrived so far and either
//! returns one complete response, reports that more bytes are needed, or fails
//! with a fatal framing error.
//!
//! # Parsing Flow
//!
//! 1. **AwaitingStatusLine**: wait for `HTTP/x.y CODE REASON` and its line break
//! 2. **AwaitingHeaders**: collect `Name: value` lines until an empty line, then
//!    pick the body framing
//! 3. **AwaitingBody**: wait until `Content-Length` bytes are buffered
//! 4. **AwaitingChunkSize** / **AwaitingChunkData**: chunked transfer coding,
//!    looping until the zero-size chunk
//! 5. **AwaitingTrailers**: discard trailer lines after the last chunk, at
//!    most `max_headers` of them
//! 6. **Complete**: decompress the body, emit the response, reset
//!
//! Bytes are only consumed once a whole line or a whole body slice is
//! available, so feeding a response one byte at a time yields the same result
//! as feeding it at once. Leftover bytes stay in the buffer for the next
//! response, which is how pipelined responses are decoded.
//!
//! # Body Framing
//!
//! | Condition | Framing |
//! |-----------|---------|
//! | 1xx, 204, 304, or a response to `HEAD` | No body |
//! | `Transfer-Encoding` ends with `chunked` | Chunked |
//! | `Content-Length: n` | Exactly `n` bytes |
//! | Neither | No body |
//!
//! # Errors
//!
//! A fatal error moves the decoder to [`ParseState::Error`] without consuming
//! the offending bytes. Every later call returns the same error until
//! [`ResponseDecoder::reset`]; HTTP framing has no point to resynchronize on.
//!
//! # Examples
//!
//! ```
//! use dirty_http_handler::client::{ByteStreamBuffer, ParseState, ResponseDecoder};
//!
//! let mut decoder = ResponseDecoder::new();
//! let mut buffer = ByteStreamBuffer::new();
//!
//! buffer.append(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nHel");
//! assert!(decoder.try_parse(&mut buffer).unwrap().is_none());
//! assert_eq!(decoder.state(), ParseState::AwaitingBody);
//!
//! buffer.append(b"lo");
//! let response = decoder.try_parse(&mut buffer).unwrap().unwrap();
//! assert_eq!(response.status, 200);
//! assert_eq!(&response.body[..], b"Hello");
//! assert!(buffer.is_empty());
//! ```

use crate::client::buffer::{trim_line_end, ByteStreamBuffer};
use crate::client::config::{DecoderLimits, Settings};
use crate::client::utils::{decompress_body, hex_dump};
use crate::error::{HandlerError, Result};
use crate::protocol::constants::{headers, CHUNKED};
use crate::protocol::{ends_with_token, is_body_less_status, parse_chunk_size, parse_content_length};
use crate::types::{DecodedResponse, Headers};
use bytes::BytesMut;

/// Position in the response state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for a status line
    AwaitingStatusLine,
    /// Status line read, collecting header lines
    AwaitingHeaders,
    /// Waiting for a fixed-length body
    AwaitingBody,
    /// Waiting for a chunk-size line
    AwaitingChunkSize,
    /// Waiting for chunk data and its line break
    AwaitingChunkData,
    /// Last chunk read, discarding trailer lines
    AwaitingTrailers,
    /// Response fully framed, about to be emitted
    Complete,
    /// Fatal framing error; the decoder refuses further input
    Error,
}

/// Incremental response decoder.
///
/// One instance per connection. It keeps its state across calls and owns no
/// bytes that have not yet been framed; the caller owns the buffer.
#[derive(Debug)]
pub struct ResponseDecoder {
    /// Current state in parse state machine
    state: ParseState,
    limits: DecoderLimits,
    decompress: bool,
    /// Whether the response being parsed answers a `HEAD` request
    head_request: bool,
    version: String,
    status: u16,
    reason: String,
    headers: Headers,
    /// Expected body length from Content-Length header
    expected_body_length: usize,
    /// Bytes left in the current chunk
    chunk_remaining: usize,
    /// Trailer lines seen after the last chunk
    trailer_count: usize,
    /// Accumulates body bytes (reassembled chunks)
    body_buffer: BytesMut,
    /// Accumulates the wire bytes of the current response
    raw: BytesMut,
    /// Latched fatal error
    failure: Option<HandlerError>,
}

impl ResponseDecoder {
    /// Create a decoder with default limits and decompression enabled
    pub fn new() -> Self {
        Self::with_limits(DecoderLimits::default(), true)
    }

    /// Create a decoder from handler settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_limits(settings.limits.clone(), settings.decompress)
    }

    /// Create a decoder with explicit limits
    pub fn with_limits(limits: DecoderLimits, decompress: bool) -> Self {
        ResponseDecoder {
            state: ParseState::AwaitingStatusLine,
            limits,
            decompress,
            head_request: false,
            version: String::new(),
            status: 0,
            reason: String::new(),
            headers: Headers::new(),
            expected_body_length: 0,
            chunk_remaining: 0,
            trailer_count: 0,
            body_buffer: BytesMut::new(),
            raw: BytesMut::new(),
            failure: None,
        }
    }

    /// Try to decode one response from `buffer`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn try_parse(&mut self, buffer: &mut ByteStreamBuffer) -> Result<Option<DecodedResponse>> {
        self.try_parse_with(buffer, false)
    }

    /// Try to decode one response, telling the decoder whether it answers a
    /// `HEAD` request (such responses never carry a body).
    pub fn try_parse_with(
        &mut self,
        buffer: &mut ByteStreamBuffer,
        head_request: bool,
    ) -> Result<Option<DecodedResponse>> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        self.head_request = head_request;

        match self.advance(buffer) {
            Ok(response) => Ok(response),
            Err(err) => {
                tracing::warn!("Failed to decode response in state {:?}: {}", self.state, err);
                tracing::trace!("Undecodable buffer: {}", hex_dump(buffer.as_slice()));
                self.state = ParseState::Error;
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    fn advance(&mut self, buffer: &mut ByteStreamBuffer) -> Result<Option<DecodedResponse>> {
        loop {
            match self.state {
                ParseState::AwaitingStatusLine => {
                    let Some(len) = self.next_line_len(buffer)? else {
                        return Ok(None);
                    };
                    let line = trim_line_end(&buffer.as_slice()[..len]);
                    if line.is_empty() {
                        // stray line break between responses
                        buffer.take_exact(len);
                        continue;
                    }
                    let (version, status, reason) = parse_status_line(line)?;
                    self.version = version;
                    self.status = status;
                    self.reason = reason;
                    self.consume(buffer, len);
                    self.state = ParseState::AwaitingHeaders;
                }
                ParseState::AwaitingHeaders => {
                    let Some(len) = self.next_line_len(buffer)? else {
                        return Ok(None);
                    };
                    let line = trim_line_end(&buffer.as_slice()[..len]);
                    if line.is_empty() {
                        self.consume(buffer, len);
                        self.select_framing()?;
                        continue;
                    }
                    if self.headers.len() >= self.limits.max_headers {
                        return Err(HandlerError::LimitExceeded(format!(
                            "More than {} headers",
                            self.limits.max_headers
                        )));
                    }
                    let (name, value) = parse_header_line(line)?;
                    self.headers.append(name, value);
                    self.consume(buffer, len);
                }
                ParseState::AwaitingBody => {
                    let Some(body) = buffer.take_exact(self.expected_body_length) else {
                        return Ok(None);
                    };
                    self.raw.extend_from_slice(&body);
                    self.body_buffer.extend_from_slice(&body);
                    self.state = ParseState::Complete;
                }
                ParseState::AwaitingChunkSize => {
                    let Some(len) = self.next_line_len(buffer)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(trim_line_end(&buffer.as_slice()[..len]))?;
                    if size > self.limits.max_body_size.saturating_sub(self.body_buffer.len()) {
                        return Err(HandlerError::LimitExceeded(format!(
                            "Chunked body exceeds {} bytes",
                            self.limits.max_body_size
                        )));
                    }
                    self.consume(buffer, len);
                    if size == 0 {
                        self.state = ParseState::AwaitingTrailers;
                    } else {
                        self.chunk_remaining = size;
                        self.state = ParseState::AwaitingChunkData;
                    }
                }
                ParseState::AwaitingChunkData => {
                    let Some(total) = chunk_frame_len(buffer, self.chunk_remaining)? else {
                        return Ok(None);
                    };
                    if let Some(frame) = buffer.take_exact(total) {
                        self.raw.extend_from_slice(&frame);
                        self.body_buffer
                            .extend_from_slice(&frame[..self.chunk_remaining]);
                    }
                    self.chunk_remaining = 0;
                    self.state = ParseState::AwaitingChunkSize;
                }
                ParseState::AwaitingTrailers => {
                    let Some(len) = self.next_line_len(buffer)? else {
                        return Ok(None);
                    };
                    let last = trim_line_end(&buffer.as_slice()[..len]).is_empty();
                    if !last {
                        if self.trailer_count >= self.limits.max_headers {
                            return Err(HandlerError::LimitExceeded(format!(
                                "More than {} trailers",
                                self.limits.max_headers
                            )));
                        }
                        self.trailer_count += 1;
                    }
                    self.consume(buffer, len);
                    if last {
                        self.state = ParseState::Complete;
                    }
                }
                ParseState::Complete => {
                    let response = self.finish();
                    self.reset_message();
                    return Ok(Some(response));
                }
                ParseState::Error => {
                    return Err(self.failure.clone().unwrap_or_else(|| {
                        HandlerError::MalformedStatusLine("Decoder is in error state".to_string())
                    }));
                }
            }
        }
    }

    /// Length of the next buffered line, enforcing the line-size limit.
    fn next_line_len(&self, buffer: &ByteStreamBuffer) -> Result<Option<usize>> {
        // a line may carry two terminator bytes on top of the limit
        let max_len = self.limits.max_line_size.saturating_add(2);
        match buffer.line_len() {
            Some(len) if len > max_len => Err(HandlerError::LimitExceeded(format!(
                "Line longer than {} bytes",
                self.limits.max_line_size
            ))),
            Some(len) => Ok(Some(len)),
            None if buffer.len() > max_len => Err(HandlerError::LimitExceeded(format!(
                "Line longer than {} bytes",
                self.limits.max_line_size
            ))),
            None => Ok(None),
        }
    }

    fn consume(&mut self, buffer: &mut ByteStreamBuffer, len: usize) {
        if let Some(bytes) = buffer.take_exact(len) {
            self.raw.extend_from_slice(&bytes);
        }
    }

    /// Decide how the body is framed once the header block has ended.
    fn select_framing(&mut self) -> Result<()> {
        if self.head_request || is_body_less_status(self.status) {
            self.state = ParseState::Complete;
            return Ok(());
        }

        let chunked = self
            .headers
            .get_joined(headers::TRANSFER_ENCODING)
            .is_some_and(|value| ends_with_token(&value, CHUNKED));
        if chunked {
            self.state = ParseState::AwaitingChunkSize;
            return Ok(());
        }

        match self.headers.get_joined(headers::CONTENT_LENGTH) {
            Some(value) => {
                let length = parse_content_length(&value)?;
                if length > self.limits.max_body_size {
                    return Err(HandlerError::LimitExceeded(format!(
                        "Content-Length {} exceeds {} bytes",
                        length, self.limits.max_body_size
                    )));
                }
                self.expected_body_length = length;
                self.state = if length == 0 {
                    ParseState::Complete
                } else {
                    ParseState::AwaitingBody
                };
            }
            None => self.state = ParseState::Complete,
        }

        Ok(())
    }

    /// Build the response for the message that just completed.
    fn finish(&mut self) -> DecodedResponse {
        let mut body = self.body_buffer.split().freeze();
        let mut decoding_error = None;

        if self.decompress && !body.is_empty() {
            if let Some(encoding) = self.headers.get_joined(headers::CONTENT_ENCODING) {
                match decompress_body(&encoding, body.clone(), self.limits.max_body_size) {
                    Ok(decoded) => body = decoded,
                    Err(err) => {
                        tracing::warn!(
                            "Response {} body could not be decoded: {}",
                            self.status,
                            err
                        );
                        decoding_error = Some(match err {
                            HandlerError::Decoding(message) => message,
                            other => other.to_string(),
                        });
                    }
                }
            }
        }

        DecodedResponse {
            version: std::mem::take(&mut self.version),
            status: self.status,
            reason: std::mem::take(&mut self.reason),
            headers: std::mem::take(&mut self.headers),
            body,
            raw: self.raw.split().freeze(),
            decoding_error,
        }
    }

    /// Reset per-message state for the next response
    fn reset_message(&mut self) {
        self.state = ParseState::AwaitingStatusLine;
        self.version.clear();
        self.status = 0;
        self.reason.clear();
        self.headers = Headers::new();
        self.expected_body_length = 0;
        self.chunk_remaining = 0;
        self.trailer_count = 0;
        self.body_buffer.clear();
        self.raw.clear();
    }

    /// Return to the initial state, clearing any latched error.
    ///
    /// Used when the owning connection is reopened.
    pub fn reset(&mut self) {
        self.reset_message();
        self.failure = None;
    }

    /// Get current parse state
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Whether part of a response has been framed but not yet emitted
    pub fn has_partial_message(&self) -> bool {
        !matches!(self.state, ParseState::AwaitingStatusLine | ParseState::Error)
    }

    /// The latched fatal error, if any
    pub fn failure(&self) -> Option<&HandlerError> {
        self.failure.as_ref()
    }

    /// Limits in force
    pub fn limits(&self) -> &DecoderLimits {
        &self.limits
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a status line into version, code and reason.
///
/// The reason may be empty but its separating space must be present.
///
/// # Examples
///
/// ```
/// use dirty_http_handler::client::parse_status_line;
///
/// let (version, code, reason) = parse_status_line(b"HTTP/1.1 404 Not Found").unwrap();
/// assert_eq!((version.as_str(), code, reason.as_str()), ("HTTP/1.1", 404, "Not Found"));
///
/// assert!(parse_status_line(b"HTTP/1.1 200").is_err());
/// assert!(parse_status_line(b"HTTP/1.1 abc OK").is_err());
/// ```
pub fn parse_status_line(line: &[u8]) -> Result<(String, u16, String)> {
    let malformed = || {
        HandlerError::MalformedStatusLine(format!("{:?}", String::from_utf8_lossy(line)))
    };

    let text = std::str::from_utf8(line).map_err(|_| malformed())?;
    let mut parts = text.splitn(3, ' ');
    let version = parts.next().ok_or_else(malformed)?;
    let code = parts.next().ok_or_else(malformed)?;
    let reason = parts.next().ok_or_else(malformed)?;

    if !version.starts_with("HTTP/") || version.len() <= "HTTP/".len() {
        return Err(malformed());
    }
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let status: u16 = code.parse().map_err(|_| malformed())?;

    Ok((version.to_string(), status, reason.to_string()))
}

/// Split a header line at its first colon.
fn parse_header_line(line: &[u8]) -> Result<(String, String)> {
    let text = String::from_utf8_lossy(line);
    let Some(colon) = text.find(':') else {
        return Err(HandlerError::MalformedHeader(format!("Missing ':' in {:?}", text)));
    };
    let name = text[..colon].trim();
    if name.is_empty() {
        return Err(HandlerError::MalformedHeader(format!("Empty header name in {:?}", text)));
    }
    Ok((name.to_string(), text[colon + 1..].trim().to_string()))
}

/// Bytes taken by `size` bytes of chunk data plus the following line break,
/// or `None` if they have not all arrived.
fn chunk_frame_len(buffer: &ByteStreamBuffer, size: usize) -> Result<Option<usize>> {
    let Some(window) = buffer.peek(size + 1) else {
        return Ok(None);
    };
    match window[size] {
        b'\n' => Ok(Some(size + 1)),
        b'\r' => match buffer.peek(size + 2) {
            None => Ok(None),
            Some(window) if window[size + 1] == b'\n' => Ok(Some(size + 2)),
            Some(_) => Err(HandlerError::MalformedChunk(
                "Chunk data not followed by a line break".to_string(),
            )),
        },
        _ => Err(HandlerError::MalformedChunk(
            "Chunk data not followed by a line break".to_string(),
        )),
    }
}
