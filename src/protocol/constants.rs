//! Wire constants for HTTP/1.1 framing.

/// Header names the handler reads or injects, in the case written on the wire.
///
/// Lookups through [`crate::Headers`] ignore case, so the same names serve
/// both purposes.
pub mod headers {
    /// `Authorization`
    pub const AUTHORIZATION: &str = "Authorization";
    /// `Connection`
    pub const CONNECTION: &str = "Connection";
    /// `Content-Encoding`
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    /// `Content-Length`
    pub const CONTENT_LENGTH: &str = "Content-Length";
    /// `Content-Type`
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// `Host`
    pub const HOST: &str = "Host";
    /// `Transfer-Encoding`
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
}

/// Keys written into send/receive metadata maps.
pub mod metadata {
    /// Request method
    pub const METHOD: &str = "method";
    /// Request target
    pub const URI: &str = "uri";
    /// `Content-Type` of the message
    pub const CONTENT_TYPE: &str = "contentType";
    /// Response status code
    pub const STATUS: &str = "status";
}

/// Protocol version written on every request line.
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Separator used when several values share one header line.
pub const HEADER_VALUE_SEPARATOR: &str = ", ";

/// `Connection` value injected when keep-alive is enabled.
pub const KEEP_ALIVE: &str = "keep-alive";

/// `Connection` value asking the peer to close after the response.
pub const CLOSE: &str = "close";

/// Transfer coding that switches the decoder into chunk framing.
pub const CHUNKED: &str = "chunked";

#[cfg(test)]
mod tests {
    use super::headers;

    #[test]
    fn test_header_names_match_http_registry() {
        let pairs = [
            (headers::AUTHORIZATION, http::header::AUTHORIZATION),
            (headers::CONNECTION, http::header::CONNECTION),
            (headers::CONTENT_ENCODING, http::header::CONTENT_ENCODING),
            (headers::CONTENT_LENGTH, http::header::CONTENT_LENGTH),
            (headers::CONTENT_TYPE, http::header::CONTENT_TYPE),
            (headers::HOST, http::header::HOST),
            (headers::TRANSFER_ENCODING, http::header::TRANSFER_ENCODING),
        ];
        for (canonical, registered) in pairs {
            assert!(canonical.eq_ignore_ascii_case(registered.as_str()));
            assert!(canonical.starts_with(|c: char| c.is_ascii_uppercase()));
        }
    }
}
