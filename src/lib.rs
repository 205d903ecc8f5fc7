#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # HTTP/1.1 over framework-owned connections
//!
//! The connection framework owns the socket lifecycle and delivers raw bytes;
//! this crate is the protocol plugin that makes HTTP out of them.
//!
//! ## Overview
//!
//! A request goes through three stages on its way out:
//!
//! 1. **Session hooks** - the [`client::SessionManager`] may refuse or
//!    rewrite the request; the default [`client::HeaderPolicy`] merges
//!    defaults from settings, then per-request overrides, then Basic
//!    `Authorization`
//! 2. **Encoding** - request line, header block and body, with
//!    `Content-Length` computed and injection attempts rejected
//! 3. **Hand-off** - the bytes go to the [`client::Channel`] with request
//!    metadata, and the request joins the pending queue
//!
//! Responses come back as arbitrary fragments. The decoder is a state machine
//! that keeps its place between deliveries, so a status line split across two
//! reads or a chunk header split across a buffer refill costs nothing but a
//! "need more data" answer.
//!
//! ## Guarantees
//!
//! - Feeding a response byte by byte decodes the same as feeding it at once
//! - All pipelined responses in a delivery are returned, in arrival order
//! - A corrupt compressed body is reported on its own response without
//!   disturbing the framing of the next one
//! - A framing error is final: the handler refuses input until the
//!   connection is reopened
//!
//! ## Module Structure
//!
//! - **[types]** - Requests, decoded responses and header lists
//! - **[error]** - Error taxonomy and result handling
//! - **[client]** - Policy, session hooks, encoder, decoder, handler facade and async driver
//! - **[protocol]** - Wire constants and header value parsing

pub mod client;
pub mod error;
pub mod protocol;
pub mod types;

pub use client::HttpHandler;
pub use error::{HandlerError, Result};
pub use types::{DecodedResponse, Headers, Metadata, PendingRequest};
