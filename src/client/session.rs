//! Session hooks.
//!
//! A [`SessionManager`] sees every step of a connection's life: it decides
//! whether requests may go out, rewrites each request before encoding, and
//! hears about responses, errors and open/close transitions. Every method has
//! a default, so an implementation overrides only what it needs.
//!
//! [`HeaderPolicy`](crate::client::HeaderPolicy) is the manager a handler uses
//! unless given another one; its `on_request` merges the configured default
//! headers and credentials into the request.
//!
//! # Examples
//!
//! ```
//! use dirty_http_handler::client::{Channel, HttpHandler, MemoryChannel, SessionManager, Settings};
//! use dirty_http_handler::{Metadata, PendingRequest, Result};
//!
//! struct Tagging;
//!
//! impl SessionManager for Tagging {
//!     fn on_request(&self, _channel: &dyn Channel, request: PendingRequest) -> Result<PendingRequest> {
//!         Ok(request.with_header("X-Session", "42"))
//!     }
//! }
//!
//! let handler = HttpHandler::with_session_manager(Settings::default(), MemoryChannel::new(), Tagging);
//! handler.send(PendingRequest::get("/"), Metadata::new()).unwrap();
//! assert_eq!(&handler.channel().sent_bytes()[..], b"GET / HTTP/1.1\r\nX-Session: 42\r\n\r\n");
//! ```

use crate::client::channel::Channel;
use crate::client::handler::ReceivedResponse;
use crate::error::{HandlerError, Result};
use crate::types::PendingRequest;
use std::sync::Arc;

/// Per-connection hooks called by [`HttpHandler`](crate::client::HttpHandler).
pub trait SessionManager: Send + Sync {
    /// Whether requests may be sent now. A handler refuses to send with
    /// [`HandlerError::NotReady`] while this is `false`.
    fn is_ready(&self) -> bool {
        true
    }

    /// The connection opened
    fn on_open(&self, _channel: &dyn Channel) {}

    /// Rewrite `request` before it is encoded.
    ///
    /// Returning an error aborts the send; the request is not queued.
    fn on_request(&self, _channel: &dyn Channel, request: PendingRequest) -> Result<PendingRequest> {
        Ok(request)
    }

    /// A response was decoded, paired with its request when there is one
    fn on_response(&self, _channel: &dyn Channel, _response: &ReceivedResponse) {}

    /// Sending, decoding or closing failed
    fn on_error(&self, _channel: &dyn Channel, _error: &HandlerError) {}

    /// The connection closed
    fn on_close(&self, _channel: &dyn Channel) {}
}

impl<M: SessionManager + ?Sized> SessionManager for Arc<M> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn on_open(&self, channel: &dyn Channel) {
        (**self).on_open(channel)
    }

    fn on_request(&self, channel: &dyn Channel, request: PendingRequest) -> Result<PendingRequest> {
        (**self).on_request(channel, request)
    }

    fn on_response(&self, channel: &dyn Channel, response: &ReceivedResponse) {
        (**self).on_response(channel, response)
    }

    fn on_error(&self, channel: &dyn Channel, error: &HandlerError) {
        (**self).on_error(channel, error)
    }

    fn on_close(&self, channel: &dyn Channel) {
        (**self).on_close(channel)
    }
}
