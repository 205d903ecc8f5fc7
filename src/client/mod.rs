//! HTTP/1.1 handler for framework-owned byte streams.
//!
//! This module turns application requests into wire bytes and raw inbound
//! bytes back into responses, for a connection it does not own:
//!
//! - **Inject headers** from configured defaults and Basic credentials
//! - **Encode requests** with validated request lines and header blocks
//! - **Decode responses** incrementally, whatever the delivery boundaries
//! - **Reassemble bodies** from `Content-Length` or chunked framing and
//!   decompress gzip/deflate
//! - **Pair responses** with pipelined requests in order
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── config   - Settings and decoder limits
//! ├── buffer   - Inbound byte accumulator
//! ├── policy   - Header injection policy
//! ├── encoder  - Request serialization
//! ├── parser   - Incremental response decoder
//! ├── channel  - Connection collaborator interface and in-memory fake
//! ├── session  - Per-connection hooks (readiness, request rewrite, events)
//! ├── handler  - Facade tying the pieces to a channel
//! ├── stream   - Async driver over AsyncRead
//! └── utils    - Decompression and connection helpers
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`HttpHandler`] | Facade the connection framework drives |
//! | [`HeaderPolicy`] | Defaults, overrides and Basic auth merge; the default session manager |
//! | [`SessionManager`] | Hooks around every send, response, error and open/close |
//! | [`RequestEncoder`] | Request serialization |
//! | [`ResponseDecoder`] | Incremental response state machine |
//! | [`ByteStreamBuffer`] | Inbound byte accumulator |
//! | [`ResponseStream`] | Responses decoded on a tokio task |
//! | [`Settings`] | Handler configuration |
//!
//! # Examples
//!
//! ## Encoding a Request
//!
//! ```
//! use dirty_http_handler::client::{HeaderPolicy, RequestEncoder, Settings};
//! use dirty_http_handler::PendingRequest;
//!
//! let settings = Settings::default()
//!     .with_credentials("user", "pass")
//!     .with_keep_alive(false);
//! let encoder = RequestEncoder::new(HeaderPolicy::new(&settings));
//!
//! let bytes = encoder.encode(&PendingRequest::get("/")).unwrap();
//! assert_eq!(
//!     &bytes[..],
//!     b"GET / HTTP/1.1\r\nAuthorization: Basic dXNlcjpwYXNz\r\n\r\n"
//! );
//! ```
//!
//! ## Decoding Pipelined Responses
//!
//! ```
//! use dirty_http_handler::client::{ByteStreamBuffer, ResponseDecoder};
//!
//! let mut decoder = ResponseDecoder::new();
//! let mut buffer = ByteStreamBuffer::new();
//! buffer.append(b"HTTP/1.1 204 No Content\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
//!
//! let first = decoder.try_parse(&mut buffer).unwrap().unwrap();
//! let second = decoder.try_parse(&mut buffer).unwrap().unwrap();
//! assert_eq!((first.status, second.status), (204, 200));
//! assert!(decoder.try_parse(&mut buffer).unwrap().is_none());
//! ```

mod buffer;
mod channel;
mod config;
mod encoder;
mod handler;
mod parser;
mod policy;
mod session;
mod stream;
mod utils;

pub use buffer::{trim_line_end, ByteStreamBuffer};
pub use channel::{Channel, MemoryChannel, MessageId, SendMode, SentFrame};
pub use config::{DecoderLimits, Settings};
pub use encoder::RequestEncoder;
pub use handler::{HttpHandler, ReceivedResponse, RequestInfo};
pub use parser::{parse_status_line, ParseState, ResponseDecoder};
pub use policy::HeaderPolicy;
pub use session::SessionManager;
pub use stream::ResponseStream;
pub use utils::*;
