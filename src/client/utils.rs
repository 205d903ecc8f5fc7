//! Utility functions for the handler.
//!
//! This module provides helpers for:
//! - Content decoding (gzip/deflate) with an output cap
//! - Connection management decisions from response headers
//! - Hex dumps of raw buffers for trace logging

use crate::error::{HandlerError, Result};
use crate::protocol::constants::{headers, CLOSE};
use crate::protocol::{has_token, parse_content_codings, ContentCoding};
use crate::types::Headers;
use bytes::Bytes;
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use std::io::Read;

/// Undo the content codings listed in `content_encoding`.
///
/// Codings are removed in reverse order of application. `identity` is a
/// no-op. An unsupported coding leaves the body untouched from that point on,
/// since nothing applied before it can be undone either.
///
/// # Errors
///
/// Returns [`HandlerError::Decoding`] if the compressed data is corrupt or
/// inflates beyond `max_size` bytes.
///
/// # Examples
///
/// ```
/// use dirty_http_handler::client::decompress_body;
/// use bytes::Bytes;
///
/// let body = Bytes::from_static(b"plain");
/// assert_eq!(decompress_body("identity", body.clone(), 1024).unwrap(), body);
/// assert!(decompress_body("gzip", body, 1024).is_err());
/// ```
pub fn decompress_body(content_encoding: &str, body: Bytes, max_size: usize) -> Result<Bytes> {
    let mut current = body;

    for coding in parse_content_codings(content_encoding).iter().rev() {
        current = match coding {
            ContentCoding::Identity => current,
            ContentCoding::Gzip => inflate(MultiGzDecoder::new(&current[..]), "gzip", max_size)?,
            ContentCoding::Deflate => match inflate(ZlibDecoder::new(&current[..]), "deflate", max_size) {
                Ok(decoded) => decoded,
                // Some servers send raw deflate without the zlib wrapper
                Err(_) => inflate(DeflateDecoder::new(&current[..]), "deflate", max_size)?,
            },
            ContentCoding::Other(name) => {
                tracing::debug!("Unsupported content coding '{}', body left encoded", name);
                return Ok(current);
            }
        };
    }

    Ok(current)
}

fn inflate<R: Read>(reader: R, coding: &str, max_size: usize) -> Result<Bytes> {
    let mut out = Vec::new();
    let limit = (max_size as u64).saturating_add(1);
    reader
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|e| HandlerError::Decoding(format!("Invalid {} body: {}", coding, e)))?;

    if out.len() > max_size {
        return Err(HandlerError::Decoding(format!(
            "Decoded {} body exceeds {} bytes",
            coding, max_size
        )));
    }

    Ok(Bytes::from(out))
}

/// Whether the peer asked to close the connection after this response
pub fn should_close_connection(response_headers: &Headers) -> bool {
    response_headers
        .get_all(headers::CONNECTION)
        .any(|value| has_token(value, CLOSE))
}

/// Lowercase hex rendering of `data`
pub fn hex_dump(data: &[u8]) -> String {
    use std::fmt::Write;

    data.iter().fold(String::with_capacity(data.len() * 2), |mut out, byte| {
        let _ = write!(out, "{:02x}", byte);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    #[test]
    fn test_gzip_round_trip() {
        let decoded = decompress_body("gzip", gzip(b"hello gzip"), 1024).unwrap();
        assert_eq!(&decoded[..], b"hello gzip");
    }

    #[test]
    fn test_deflate_zlib_and_raw() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(b"zlib body").unwrap();
        let decoded = decompress_body("deflate", Bytes::from(zlib.finish().unwrap()), 1024).unwrap();
        assert_eq!(&decoded[..], b"zlib body");

        let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(b"raw body").unwrap();
        let decoded = decompress_body("Deflate", Bytes::from(raw.finish().unwrap()), 1024).unwrap();
        assert_eq!(&decoded[..], b"raw body");
    }

    #[test]
    fn test_corrupt_gzip_is_decoding_error() {
        let mut body = gzip(b"hello gzip").to_vec();
        body[0] ^= 0xff;
        let err = decompress_body("gzip", Bytes::from(body), 1024).unwrap_err();
        assert!(matches!(err, HandlerError::Decoding(_)));
    }

    #[test]
    fn test_decoded_size_capped() {
        let body = gzip(&[b'a'; 4096]);
        assert!(decompress_body("gzip", body.clone(), 100).is_err());
        assert_eq!(decompress_body("gzip", body, 4096).unwrap().len(), 4096);
    }

    #[test]
    fn test_unsupported_coding_passthrough() {
        let body = Bytes::from_static(b"\x00brotli?");
        assert_eq!(decompress_body("br", body.clone(), 1024).unwrap(), body);
    }

    #[test]
    fn test_should_close_connection() {
        let headers: Headers = vec![("Connection", "Close")].into_iter().collect();
        assert!(should_close_connection(&headers));
        let headers: Headers = vec![("Connection", "keep-alive")].into_iter().collect();
        assert!(!should_close_connection(&headers));
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(b"\r\n\x00\xff"), "0d0a00ff");
    }
}
