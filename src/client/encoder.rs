//! Request serialization.
//!
//! Turns a [`PendingRequest`] into HTTP/1.1 wire bytes:
//!
//! ```text
//! METHOD target HTTP/1.1\r\n
//! Name: value\r\n          (defaults, overrides, Content-Length, Authorization)
//! \r\n
//! body
//! ```
//!
//! `Content-Length` is computed when the request has a body, does not already
//! name a length, and does not ask for chunked transfer coding. With a chunked
//! override the body is written verbatim and must already be chunk-framed.

use crate::client::policy::HeaderPolicy;
use crate::error::{HandlerError, Result};
use crate::protocol::constants::{headers, CHUNKED, CRLF, HTTP_VERSION};
use crate::protocol::ends_with_token;
use crate::types::{Headers, PendingRequest};
use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderName, Method};

/// Serializes requests, applying a [`HeaderPolicy`].
#[derive(Debug, Clone)]
pub struct RequestEncoder {
    policy: HeaderPolicy,
}

impl RequestEncoder {
    /// Create an encoder around `policy`
    pub fn new(policy: HeaderPolicy) -> Self {
        RequestEncoder { policy }
    }

    /// The policy used for header injection
    pub fn policy(&self) -> &HeaderPolicy {
        &self.policy
    }

    /// Encode `request` into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Encoding`] if the method or target is empty or
    /// not a single token, or if any header name or value would break the
    /// header block (line terminators, invalid name characters).
    ///
    /// # Examples
    ///
    /// ```
    /// use dirty_http_handler::client::{HeaderPolicy, RequestEncoder, Settings};
    /// use dirty_http_handler::PendingRequest;
    ///
    /// let encoder = RequestEncoder::new(HeaderPolicy::new(&Settings::default().with_keep_alive(false)));
    /// let bytes = encoder.encode(&PendingRequest::new("POST", "/form").with_body("a=1")).unwrap();
    /// assert_eq!(&bytes[..], b"POST /form HTTP/1.1\r\nContent-Length: 3\r\n\r\na=1");
    /// ```
    pub fn encode(&self, request: &PendingRequest) -> Result<Bytes> {
        Self::encode_prepared(&self.policy.prepare(request.clone()))
    }

    /// Encode `request` with its headers exactly as given.
    ///
    /// Nothing is injected except a computed `Content-Length`, appended last
    /// under the same rules as [`RequestEncoder::encode`].
    ///
    /// # Errors
    ///
    /// Same as [`RequestEncoder::encode`].
    pub fn encode_prepared(request: &PendingRequest) -> Result<Bytes> {
        validate_method(&request.method)?;
        validate_target(&request.target)?;

        let mut fields = request.headers.clone();
        append_content_length(&mut fields, request.body.as_ref());
        for (name, value) in fields.iter() {
            validate_header(name, value)?;
        }

        let body_len = request.body.as_ref().map_or(0, Bytes::len);
        let mut out = BytesMut::with_capacity(256 + body_len);

        out.put_slice(request.method.as_bytes());
        out.put_u8(b' ');
        out.put_slice(request.target.as_bytes());
        out.put_u8(b' ');
        out.put_slice(HTTP_VERSION.as_bytes());
        out.put_slice(CRLF);

        for (name, value) in fields.iter() {
            out.put_slice(name.as_bytes());
            out.put_slice(b": ");
            out.put_slice(value.as_bytes());
            out.put_slice(CRLF);
        }
        out.put_slice(CRLF);

        if let Some(body) = &request.body {
            out.put_slice(body);
        }

        Ok(out.freeze())
    }
}

/// Append `Content-Length` for `body` unless the headers already frame it.
pub(crate) fn append_content_length(fields: &mut Headers, body: Option<&Bytes>) {
    if let Some(body) = body {
        if needs_content_length(fields) {
            fields.append(headers::CONTENT_LENGTH, body.len().to_string());
        }
    }
}

fn needs_content_length(fields: &Headers) -> bool {
    if fields.contains(headers::CONTENT_LENGTH) {
        return false;
    }
    !fields
        .get_joined(headers::TRANSFER_ENCODING)
        .is_some_and(|value| ends_with_token(&value, CHUNKED))
}

fn validate_method(method: &str) -> Result<()> {
    if method.is_empty() {
        return Err(HandlerError::Encoding("Request method is empty".to_string()));
    }
    Method::from_bytes(method.as_bytes())
        .map(|_| ())
        .map_err(|_| HandlerError::Encoding(format!("Invalid request method: {:?}", method)))
}

fn validate_target(target: &str) -> Result<()> {
    if target.is_empty() {
        return Err(HandlerError::Encoding("Request target is empty".to_string()));
    }
    if target.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(HandlerError::Encoding(format!("Invalid request target: {:?}", target)));
    }
    Ok(())
}

fn validate_header(name: &str, value: &str) -> Result<()> {
    if HeaderName::from_bytes(name.as_bytes()).is_err() {
        return Err(HandlerError::Encoding(format!("Invalid header name: {:?}", name)));
    }
    if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0)) {
        return Err(HandlerError::Encoding(format!(
            "Header {} contains a line terminator",
            name
        )));
    }
    Ok(())
}
