//! Header parsing and formatting for HTTP/1.1 framing.
//!
//! Only the headers that decide how bytes are framed or injected get
//! structured treatment here; everything else travels as opaque text.
//!
//! # Header Formats
//!
//! | Header | Format | Example |
//! |--------|--------|---------|
//! | Content-Length | Decimal, repeated values must agree | `25`, `25, 25` |
//! | Transfer-Encoding | Comma-separated codings | `gzip, chunked` |
//! | Content-Encoding | Comma-separated codings, applied in order | `gzip` |
//! | Connection | Comma-separated tokens | `keep-alive`, `close` |
//! | Authorization | `Basic` + base64 of `user:password` | `Basic dXNlcjpwYXNz` |
//!
//! # Examples
//!
//! ```
//! use dirty_http_handler::protocol::{
//!     basic_auth_value, has_token, parse_chunk_size, parse_content_length,
//! };
//!
//! assert_eq!(parse_content_length("25").unwrap(), 25);
//! assert!(has_token("gzip, chunked", "chunked"));
//! assert_eq!(parse_chunk_size(b"1a;name=value").unwrap(), 26);
//! assert_eq!(basic_auth_value("user", "pass"), "Basic dXNlcjpwYXNz");
//! ```

use crate::error::{HandlerError, Result};
use crate::protocol::constants::HEADER_VALUE_SEPARATOR;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// A content coding named by `Content-Encoding`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentCoding {
    /// `identity`, no transformation
    Identity,
    /// `gzip` or `x-gzip`
    Gzip,
    /// `deflate` (zlib-wrapped, raw deflate tolerated)
    Deflate,
    /// Anything else; bodies with such codings are passed through untouched
    Other(String),
}

/// Join several header values into one header line value.
///
/// # Examples
///
/// ```
/// use dirty_http_handler::protocol::format_header_values;
///
/// let values = vec!["gzip".to_string(), "deflate".to_string()];
/// assert_eq!(format_header_values(&values), "gzip, deflate");
/// ```
pub fn format_header_values(values: &[String]) -> String {
    values.join(HEADER_VALUE_SEPARATOR)
}

/// Build a `Basic` authorization value from credentials.
pub fn basic_auth_value(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}

/// Format a `Host` header value, omitting the default port.
///
/// # Examples
///
/// ```
/// use dirty_http_handler::protocol::format_host;
///
/// assert_eq!(format_host("example.com", Some(80)), "example.com");
/// assert_eq!(format_host("example.com", Some(8080)), "example.com:8080");
/// assert_eq!(format_host("example.com", None), "example.com");
/// ```
pub fn format_host(host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) if port != 80 => format!("{}:{}", host, port),
        _ => host.to_string(),
    }
}

/// Parse a `Content-Length` value.
///
/// A list of identical values (`5, 5`) is accepted; differing values are not.
///
/// # Errors
///
/// Returns [`HandlerError::MalformedHeader`] for empty, non-numeric or
/// conflicting values.
pub fn parse_content_length(value: &str) -> Result<usize> {
    let mut parsed: Option<usize> = None;

    for part in value.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HandlerError::MalformedHeader(format!(
                "Invalid Content-Length: {}",
                value
            )));
        }
        let length: usize = trimmed.parse().map_err(|_| {
            HandlerError::MalformedHeader(format!("Content-Length out of range: {}", value))
        })?;

        match parsed {
            Some(previous) if previous != length => {
                return Err(HandlerError::MalformedHeader(format!(
                    "Conflicting Content-Length values: {}",
                    value
                )));
            }
            _ => parsed = Some(length),
        }
    }

    parsed.ok_or_else(|| HandlerError::MalformedHeader("Empty Content-Length".to_string()))
}

/// Check whether a comma-separated header value contains `token`
/// (ASCII case-insensitive).
pub fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Check whether the last non-empty element of a comma-separated header
/// value is `token` (ASCII case-insensitive).
///
/// A message is chunk-framed only when `chunked` is the final transfer
/// coding; `chunked, gzip` is not.
pub fn ends_with_token(value: &str, token: &str) -> bool {
    value
        .rsplit(',')
        .map(str::trim)
        .find(|part| !part.is_empty())
        .is_some_and(|last| last.eq_ignore_ascii_case(token))
}

/// Parse the codings listed in a `Content-Encoding` value, in the order
/// they were applied.
pub fn parse_content_codings(value: &str) -> Vec<ContentCoding> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.to_ascii_lowercase().as_str() {
            "identity" => ContentCoding::Identity,
            "gzip" | "x-gzip" => ContentCoding::Gzip,
            "deflate" => ContentCoding::Deflate,
            other => ContentCoding::Other(other.to_string()),
        })
        .collect()
}

/// Parse a chunk-size line (without its terminator).
///
/// Chunk extensions after `;` are ignored.
///
/// # Errors
///
/// Returns [`HandlerError::MalformedChunk`] if the size is not hexadecimal or
/// does not fit in `usize`.
pub fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let size_part = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let text = std::str::from_utf8(size_part)
        .map_err(|_| HandlerError::MalformedChunk("Chunk size is not ASCII".to_string()))?
        .trim();

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HandlerError::MalformedChunk(format!(
            "Invalid chunk size: {:?}",
            String::from_utf8_lossy(line)
        )));
    }

    usize::from_str_radix(text, 16)
        .map_err(|_| HandlerError::MalformedChunk(format!("Chunk size out of range: {}", text)))
}

/// Statuses that never carry a body regardless of framing headers.
#[inline]
pub fn is_body_less_status(code: u16) -> bool {
    (100..200).contains(&code) || code == 204 || code == 304
}
