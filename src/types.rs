//! Core message types: outbound requests, decoded responses and header lists.

use crate::error::{HandlerError, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// Metadata attached to a message on its way through the channel.
pub type Metadata = BTreeMap<String, String>;

/// An ordered header list.
///
/// Insertion order is preserved and a name may appear more than once.
/// Lookups are ASCII case-insensitive; stored names keep their original case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing entries with the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every entry named `name` with a single entry.
    ///
    /// The new entry takes the position of the first removed one, or goes to
    /// the end if the name was absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let position = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(&name));
        self.remove(&name);
        let index = position.unwrap_or(self.entries.len());
        self.entries.insert(index, (name, value.into()));
    }

    /// Remove every entry named `name`, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in arrival order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name` joined with `", "`, as a list-valued header reads
    pub fn get_joined(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self.get_all(name).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Whether any entry is named `name`
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Headers {
            entries: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a (String, String);
    type IntoIter = std::slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// One outbound request, consumed by the encoder.
///
/// # Examples
///
/// ```
/// use dirty_http_handler::PendingRequest;
///
/// let request = PendingRequest::new("POST", "/test/demo_form.php")
///     .with_header("Content-Type", "application/x-www-form-urlencoded")
///     .with_body("name1=value1&name2=value2");
/// assert_eq!(request.method, "POST");
/// assert!(request.body.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Request method, sent verbatim
    pub method: String,
    /// Request target (origin form `/path?q` or absolute form `http://host/path`)
    pub target: String,
    /// Per-request headers; these replace same-named defaults
    pub headers: Headers,
    /// Body bytes, written verbatim after the header block
    pub body: Option<Bytes>,
}

impl PendingRequest {
    /// Create a request with no headers and no body
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        PendingRequest {
            method: method.into(),
            target: target.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` request
    pub fn get(target: impl Into<String>) -> Self {
        Self::new("GET", target)
    }

    /// Add a header override
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach a body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether responses to this request never carry a body
    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }
}

/// A complete HTTP response surfaced by the decoder.
///
/// The body has been reassembled from chunks and, when the response declared
/// a supported `Content-Encoding`, decompressed. If decompression failed the
/// body holds the raw bytes and [`DecodedResponse::decoding_error`] is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    /// Protocol version from the status line, e.g. `HTTP/1.1`
    pub version: String,
    /// Status code
    pub status: u16,
    /// Reason phrase (may be empty)
    pub reason: String,
    /// Response headers in arrival order
    pub headers: Headers,
    /// Body after chunk reassembly and decompression
    pub body: Bytes,
    /// Exact wire bytes of the whole response
    pub raw: Bytes,
    /// Decompression failure message, if any
    pub decoding_error: Option<String>,
}

impl DecodedResponse {
    /// Return the response if its body decoded cleanly, or the
    /// [`HandlerError::Decoding`] that occurred.
    pub fn check_decoding(&self) -> Result<&Self> {
        match &self.decoding_error {
            Some(message) => Err(HandlerError::Decoding(message.clone())),
            None => Ok(self),
        }
    }

    /// Body as UTF-8 text, lossily converted
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `Content-Type` header value
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(crate::protocol::constants::headers::CONTENT_TYPE)
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Display for DecodedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.version, self.status, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive_lookup() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_headers_duplicates_preserved() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("X-Other", "x");
        headers.append("set-cookie", "b=2");
        let cookies: Vec<&str> = headers.get_all("Set-Cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(headers.get_joined("set-cookie").as_deref(), Some("a=1, b=2"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_headers_set_keeps_position() {
        let mut headers: Headers = vec![("A", "1"), ("B", "2"), ("a", "3")].into_iter().collect();
        headers.set("A", "9");
        let names: Vec<(&str, &str)> = headers.iter().collect();
        assert_eq!(names, vec![("A", "9"), ("B", "2")]);
    }

    #[test]
    fn test_pending_request_builders() {
        let request = PendingRequest::get("/").with_header("Accept", "*/*");
        assert_eq!(request.method, "GET");
        assert_eq!(request.headers.get("accept"), Some("*/*"));
        assert!(request.body.is_none());
        assert!(PendingRequest::new("head", "/").is_head());
    }

    #[test]
    fn test_check_decoding() {
        let mut response = DecodedResponse {
            version: "HTTP/1.1".into(),
            status: 200,
            reason: "OK".into(),
            headers: Headers::new(),
            body: Bytes::new(),
            raw: Bytes::new(),
            decoding_error: None,
        };
        assert!(response.check_decoding().is_ok());
        response.decoding_error = Some("invalid gzip header".into());
        assert_eq!(
            response.check_decoding().unwrap_err(),
            HandlerError::Decoding("invalid gzip header".into())
        );
        assert_eq!(response.to_string(), "HTTP/1.1 200 OK");
    }
}
