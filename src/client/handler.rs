//! Handler facade.
//!
//! [`HttpHandler`] is what the connection framework plugs in. Outbound, it
//! encodes requests, records them in a bounded FIFO and hands the bytes to the
//! [`Channel`]. Inbound, it buffers raw deliveries and drains every complete
//! response, pairing each with the request it answers.
//!
//! # Locking
//!
//! The outbound and inbound paths use separate locks and share nothing but
//! the pending queue, so a connection can send and receive concurrently.
//! Concurrent sends serialize on the outbound lock so the order requests are
//! queued matches the order they reach the channel.
//!
//! # Examples
//!
//! ```
//! use dirty_http_handler::client::{HttpHandler, MemoryChannel, Settings};
//! use dirty_http_handler::{Metadata, PendingRequest};
//!
//! let handler = HttpHandler::new(Settings::default(), MemoryChannel::new());
//! handler.send(PendingRequest::get("/status"), Metadata::new()).unwrap();
//! assert!(handler.channel().sent_bytes().starts_with(b"GET /status HTTP/1.1\r\n"));
//!
//! let received = handler
//!     .on_receive(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
//!     .unwrap();
//! assert_eq!(received.len(), 1);
//! assert_eq!(received[0].metadata["uri"], "/status");
//! assert_eq!(received[0].metadata["status"], "200");
//! ```

use crate::client::buffer::ByteStreamBuffer;
use crate::client::channel::{Channel, MessageId, SendMode};
use crate::client::config::Settings;
use crate::client::encoder::RequestEncoder;
use crate::client::parser::ResponseDecoder;
use crate::client::policy::HeaderPolicy;
use crate::client::session::SessionManager;
use crate::client::utils::should_close_connection;
use crate::error::{HandlerError, Result};
use crate::protocol::constants::{headers, metadata};
use crate::types::{DecodedResponse, Metadata, PendingRequest};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A sent request awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Request method
    pub method: String,
    /// Request target, as sent
    pub target: String,
    /// Metadata as handed to the channel
    pub metadata: Metadata,
}

impl RequestInfo {
    fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }
}

/// A decoded response together with what is known about its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedResponse {
    /// The decoded response
    pub response: DecodedResponse,
    /// The request this answers; `None` for interim 1xx responses and for
    /// responses nobody asked for
    pub request: Option<RequestInfo>,
    /// Request metadata plus `status` and `contentType` of the response
    pub metadata: Metadata,
}

#[derive(Debug)]
struct Inbound {
    buffer: ByteStreamBuffer,
    decoder: ResponseDecoder,
}

/// HTTP/1.1 handler bound to one connection.
///
/// `M` is the [`SessionManager`] consulted on every send and told about
/// every response, error and open/close. [`HttpHandler::new`] uses a
/// [`HeaderPolicy`] built from the settings.
pub struct HttpHandler<C: Channel, M: SessionManager = HeaderPolicy> {
    settings: Settings,
    manager: M,
    channel: C,
    outbound: Mutex<()>,
    inbound: Mutex<Inbound>,
    pending: Mutex<VecDeque<RequestInfo>>,
}

impl<C: Channel> HttpHandler<C> {
    /// Build a handler from a settings snapshot and the owning channel
    pub fn new(settings: Settings, channel: C) -> Self {
        let manager = HeaderPolicy::new(&settings);
        Self::with_session_manager(settings, channel, manager)
    }

    /// Header policy used for every request
    pub fn policy(&self) -> &HeaderPolicy {
        &self.manager
    }
}

impl<C: Channel, M: SessionManager> HttpHandler<C, M> {
    /// Build a handler whose requests and lifecycle go through `manager`.
    ///
    /// The manager replaces header injection entirely: requests are encoded
    /// with the headers `manager` returns from
    /// [`on_request`](SessionManager::on_request).
    pub fn with_session_manager(settings: Settings, channel: C, manager: M) -> Self {
        let decoder = ResponseDecoder::from_settings(&settings);

        HttpHandler {
            manager,
            channel,
            outbound: Mutex::new(()),
            inbound: Mutex::new(Inbound {
                buffer: ByteStreamBuffer::new(),
                decoder,
            }),
            pending: Mutex::new(VecDeque::new()),
            settings,
        }
    }

    /// Rewrite `request` through the session manager and encode it, without
    /// sending or queueing it.
    pub fn on_send(&self, request: &PendingRequest) -> Result<Bytes> {
        let request = self.manager.on_request(&self.channel, request.clone())?;
        RequestEncoder::encode_prepared(&request)
    }

    /// Encode `request`, queue it and hand it to the channel.
    ///
    /// `method`, `uri` and, when present, `contentType` are added to
    /// `metadata` before it reaches the channel. The channel is opened first
    /// if needed.
    ///
    /// # Errors
    ///
    /// - [`HandlerError::NotReady`] while the session manager is not ready
    /// - [`HandlerError::Encoding`] if the request cannot be serialized
    /// - [`HandlerError::QueueFull`] if too many requests await responses
    /// - any error from the session manager or the channel; the request is
    ///   not queued in that case
    pub fn send(&self, request: PendingRequest, mut metadata: Metadata) -> Result<MessageId> {
        if !self.manager.is_ready() {
            tracing::debug!("Session not ready, refusing {} {}", request.method, request.target);
            return Err(HandlerError::NotReady);
        }

        let request = self.manager.on_request(&self.channel, request)?;
        let bytes = RequestEncoder::encode_prepared(&request)?;

        metadata.insert(metadata::METHOD.to_string(), request.method.clone());
        metadata.insert(metadata::URI.to_string(), request.target.clone());
        if let Some(content_type) = request.headers.get(headers::CONTENT_TYPE) {
            metadata.insert(metadata::CONTENT_TYPE.to_string(), content_type.to_string());
        }

        let _order = self.outbound.lock();

        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.settings.request_queue_size {
                tracing::warn!(
                    "Request queue full, rejecting {} {}",
                    request.method,
                    request.target
                );
                return Err(HandlerError::QueueFull(pending.len()));
            }
            pending.push_back(RequestInfo {
                method: request.method.clone(),
                target: request.target.clone(),
                metadata: metadata.clone(),
            });
        }

        let sent = self.open_if_closed().and_then(|_| {
            self.channel
                .send(bytes.clone(), metadata, SendMode::HandleAndMangle)
        });

        match sent {
            Ok(id) => {
                tracing::debug!(
                    "Sent {} {} as {} ({} bytes)",
                    request.method,
                    request.target,
                    id,
                    bytes.len()
                );
                Ok(id)
            }
            Err(err) => {
                // nothing else can queue while the outbound lock is held
                self.pending.lock().pop_back();
                tracing::warn!("Sending {} {} failed: {}", request.method, request.target, err);
                self.manager.on_error(&self.channel, &err);
                Err(err)
            }
        }
    }

    fn open_if_closed(&self) -> Result<()> {
        if !self.channel.is_open() {
            tracing::debug!("Opening connection to {}", self.channel.address());
            self.channel.open()?;
        }
        Ok(())
    }

    /// Buffer `data` and decode every complete response.
    ///
    /// Returns an empty batch when only part of a response has arrived. When
    /// a response asks for `Connection: close` the channel is closed after
    /// the batch is decoded; a failure to close is reported to the session
    /// manager and does not discard the batch.
    ///
    /// # Errors
    ///
    /// A fatal framing error is returned as soon as it is hit, unless the same
    /// delivery already completed some responses; those are returned first
    /// and the error is reported by the next call. The handler then refuses
    /// input until the connection is reopened.
    pub fn on_receive(&self, data: &[u8]) -> Result<Vec<ReceivedResponse>> {
        let mut inbound = self.inbound.lock();
        let Inbound { buffer, decoder } = &mut *inbound;

        if let Some(err) = decoder.failure() {
            return Err(err.clone());
        }

        buffer.append(data);

        let mut received = Vec::new();
        let mut failure = None;
        let mut close = false;

        loop {
            let head = self.pending.lock().front().is_some_and(RequestInfo::is_head);

            let response = match decoder.try_parse_with(buffer, head) {
                Ok(Some(response)) => response,
                Ok(None) => break,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };

            // interim responses precede the final one for the same request
            let request = if response.status < 200 {
                None
            } else {
                let request = self.pending.lock().pop_front();
                if request.is_none() {
                    tracing::warn!("Received {} with no request pending", response);
                }
                request
            };

            close |= should_close_connection(&response.headers);
            tracing::debug!(
                "Received {} ({} body bytes){}",
                response,
                response.body.len(),
                request
                    .as_ref()
                    .map(|r| format!(" for {} {}", r.method, r.target))
                    .unwrap_or_default()
            );

            let metadata = response_metadata(&response, request.as_ref());
            received.push(ReceivedResponse {
                response,
                request,
                metadata,
            });
        }

        drop(inbound);

        for response in &received {
            self.manager.on_response(&self.channel, response);
        }

        if let Some(err) = &failure {
            tracing::warn!("Response framing failed on {}: {}", self.channel.address(), err);
            self.manager.on_error(&self.channel, err);
        }

        if close {
            tracing::debug!("Peer requested close, closing {}", self.channel.address());
            if let Err(err) = self.channel.close() {
                tracing::warn!("Closing {} failed: {}", self.channel.address(), err);
                self.manager.on_error(&self.channel, &err);
            }
        }

        match failure {
            Some(err) if received.is_empty() => Err(err),
            _ => Ok(received),
        }
    }

    /// The connection (re)opened: start from a clean state
    pub fn on_open(&self) {
        self.reset();
        self.manager.on_open(&self.channel);
    }

    /// The connection closed: drop pending requests and buffered bytes
    pub fn on_close(&self) {
        let pending = self.pending.lock().len();
        let (buffered, partial) = {
            let inbound = self.inbound.lock();
            (inbound.buffer.len(), inbound.decoder.has_partial_message())
        };
        if pending > 0 || partial || buffered > 0 {
            tracing::warn!(
                "Connection closed with {} pending requests and {} buffered bytes",
                pending,
                buffered
            );
        }
        self.reset();
        self.manager.on_close(&self.channel);
    }

    fn reset(&self) {
        let mut inbound = self.inbound.lock();
        inbound.buffer.clear();
        inbound.decoder.reset();
        drop(inbound);
        self.pending.lock().clear();
    }

    /// Requests sent but not yet answered
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Bytes buffered but not yet part of a decoded response
    pub fn buffered_bytes(&self) -> usize {
        self.inbound.lock().buffer.len()
    }

    /// Settings snapshot the handler was built from
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The session manager consulted on every send
    pub fn session_manager(&self) -> &M {
        &self.manager
    }

    /// The owning connection
    pub fn channel(&self) -> &C {
        &self.channel
    }
}

fn response_metadata(response: &DecodedResponse, request: Option<&RequestInfo>) -> Metadata {
    let mut out = request.map(|r| r.metadata.clone()).unwrap_or_default();
    out.remove(metadata::CONTENT_TYPE);
    if let Some(request) = request {
        out.insert(metadata::METHOD.to_string(), request.method.clone());
        out.insert(metadata::URI.to_string(), request.target.clone());
    }
    out.insert(metadata::STATUS.to_string(), response.status.to_string());
    if let Some(content_type) = response.content_type() {
        out.insert(metadata::CONTENT_TYPE.to_string(), content_type.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::channel::MemoryChannel;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    const OK: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: plain/text\r\nContent-Length: 2\r\n\r\nhi";

    fn handler(settings: Settings) -> HttpHandler<MemoryChannel> {
        HttpHandler::new(settings, MemoryChannel::new())
    }

    #[test]
    fn test_send_opens_channel_and_fills_metadata() {
        let handler = handler(Settings::default());
        let mut meta = Metadata::new();
        meta.insert("trace".to_string(), "abc".to_string());

        let request = PendingRequest::new("POST", "/form")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("a=1");
        handler.send(request, meta).unwrap();

        assert!(handler.channel().is_open());
        let frame = &handler.channel().sent()[0];
        assert_eq!(frame.mode, SendMode::HandleAndMangle);
        assert_eq!(frame.metadata["method"], "POST");
        assert_eq!(frame.metadata["uri"], "/form");
        assert_eq!(frame.metadata["contentType"], "application/x-www-form-urlencoded");
        assert_eq!(frame.metadata["trace"], "abc");
        assert_eq!(handler.pending_requests(), 1);
    }

    #[test]
    fn test_response_paired_with_request() {
        let handler = handler(Settings::default());
        handler.send(PendingRequest::get("/a"), Metadata::new()).unwrap();

        let received = handler.on_receive(OK).unwrap();
        assert_eq!(received.len(), 1);
        let first = &received[0];
        assert_eq!(first.request.as_ref().map(|r| r.target.as_str()), Some("/a"));
        assert_eq!(first.metadata["status"], "200");
        assert_eq!(first.metadata["contentType"], "plain/text");
        assert_eq!(first.metadata["method"], "GET");
        assert_eq!(handler.pending_requests(), 0);
    }

    #[test]
    fn test_queue_full() {
        let handler = handler(Settings::default().with_request_queue_size(1));
        handler.send(PendingRequest::get("/1"), Metadata::new()).unwrap();
        let err = handler.send(PendingRequest::get("/2"), Metadata::new()).unwrap_err();
        assert_eq!(err, HandlerError::QueueFull(1));
        assert!(err.is_recoverable());
        assert_eq!(handler.channel().sent().len(), 1);
    }

    #[test]
    fn test_encoding_error_not_queued() {
        let handler = handler(Settings::default());
        assert!(handler.send(PendingRequest::new("", "/"), Metadata::new()).is_err());
        assert_eq!(handler.pending_requests(), 0);
        assert!(handler.channel().sent().is_empty());
    }

    #[test]
    fn test_head_response_has_no_body() {
        let handler = handler(Settings::default());
        handler.send(PendingRequest::new("HEAD", "/"), Metadata::new()).unwrap();
        handler.send(PendingRequest::get("/"), Metadata::new()).unwrap();

        let mut input = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n".to_vec();
        input.extend_from_slice(OK);
        let received = handler.on_receive(&input).unwrap();

        assert_eq!(received.len(), 2);
        assert!(received[0].response.body.is_empty());
        assert_eq!(&received[1].response.body[..], b"hi");
    }

    #[test]
    fn test_interim_response_keeps_request_pending() {
        let handler = handler(Settings::default());
        handler.send(PendingRequest::get("/"), Metadata::new()).unwrap();

        let mut input = b"HTTP/1.1 100 Continue\r\n\r\n".to_vec();
        input.extend_from_slice(OK);
        let received = handler.on_receive(&input).unwrap();

        assert_eq!(received.len(), 2);
        assert!(received[0].request.is_none());
        assert_eq!(received[0].metadata["status"], "100");
        assert!(received[1].request.is_some());
    }

    #[test]
    fn test_connection_close_closes_channel() {
        let handler = handler(Settings::default());
        handler.send(PendingRequest::get("/"), Metadata::new()).unwrap();
        handler
            .on_receive(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        assert!(!handler.channel().is_open());
        assert_eq!(handler.channel().close_count(), 1);
    }

    #[test]
    fn test_error_after_complete_response_is_deferred() {
        let handler = handler(Settings::default());
        let mut input = OK.to_vec();
        input.extend_from_slice(b"garbage\r\n");

        let received = handler.on_receive(&input).unwrap();
        assert_eq!(received.len(), 1);

        let err = handler.on_receive(b"").unwrap_err();
        assert!(matches!(err, HandlerError::MalformedStatusLine(_)));
        assert!(handler.on_receive(OK).is_err());

        handler.on_open();
        assert_eq!(handler.on_receive(OK).unwrap().len(), 1);
    }

    #[test]
    fn test_on_close_clears_state() {
        let handler = handler(Settings::default());
        handler.send(PendingRequest::get("/"), Metadata::new()).unwrap();
        assert!(handler.on_receive(b"HTTP/1.1 200 OK\r\n").unwrap().is_empty());
        assert_eq!(handler.pending_requests(), 1);

        handler.on_close();
        assert_eq!(handler.pending_requests(), 0);
        assert_eq!(handler.buffered_bytes(), 0);
    }

    /// Channel whose `close` always fails.
    struct StuckChannel(MemoryChannel);

    impl Channel for StuckChannel {
        fn send(&self, data: Bytes, metadata: Metadata, mode: SendMode) -> Result<MessageId> {
            self.0.send(data, metadata, mode)
        }

        fn is_open(&self) -> bool {
            self.0.is_open()
        }

        fn open(&self) -> Result<()> {
            self.0.open()
        }

        fn close(&self) -> Result<()> {
            Err(HandlerError::Channel("close refused".to_string()))
        }

        fn address(&self) -> SocketAddr {
            self.0.address()
        }

        fn is_secure(&self) -> bool {
            self.0.is_secure()
        }
    }

    #[derive(Default)]
    struct Recorder {
        busy: AtomicBool,
        events: parking_lot::Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }

        fn record(&self, event: String) {
            self.events.lock().push(event);
        }
    }

    impl SessionManager for Recorder {
        fn is_ready(&self) -> bool {
            !self.busy.load(Ordering::SeqCst)
        }

        fn on_open(&self, _channel: &dyn Channel) {
            self.record("open".to_string());
        }

        fn on_request(&self, _channel: &dyn Channel, request: PendingRequest) -> Result<PendingRequest> {
            self.record(format!("request {}", request.target));
            if request.target == "/forbidden" {
                return Err(HandlerError::Encoding("refused by session".to_string()));
            }
            Ok(request.with_header("X-Session", "s1"))
        }

        fn on_response(&self, _channel: &dyn Channel, response: &ReceivedResponse) {
            let target = response.request.as_ref().map_or("-", |r| r.target.as_str());
            self.record(format!("response {} {}", response.response.status, target));
        }

        fn on_error(&self, _channel: &dyn Channel, error: &HandlerError) {
            self.record(format!("error {}", error));
        }

        fn on_close(&self, _channel: &dyn Channel) {
            self.record("close".to_string());
        }
    }

    fn recorded() -> (HttpHandler<MemoryChannel, Arc<Recorder>>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let handler = HttpHandler::with_session_manager(
            Settings::default(),
            MemoryChannel::new(),
            Arc::clone(&recorder),
        );
        (handler, recorder)
    }

    #[test]
    fn test_failed_close_keeps_decoded_responses() {
        let handler = HttpHandler::new(Settings::default(), StuckChannel(MemoryChannel::new()));
        handler.send(PendingRequest::get("/a"), Metadata::new()).unwrap();
        handler.send(PendingRequest::get("/b"), Metadata::new()).unwrap();

        let mut input = OK.to_vec();
        input.extend_from_slice(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n");
        let received = handler.on_receive(&input).unwrap();

        assert_eq!(received.len(), 2);
        assert_eq!(received[1].metadata["uri"], "/b");
        assert_eq!(handler.pending_requests(), 0);
    }

    #[test]
    fn test_session_manager_rewrites_requests() {
        let (handler, recorder) = recorded();
        handler.send(PendingRequest::get("/a"), Metadata::new()).unwrap();

        assert_eq!(
            &handler.channel().sent_bytes()[..],
            b"GET /a HTTP/1.1\r\nX-Session: s1\r\n\r\n"
        );
        assert_eq!(recorder.events(), vec!["request /a"]);
    }

    #[test]
    fn test_session_manager_refusal_not_queued() {
        let (handler, _recorder) = recorded();
        let err = handler
            .send(PendingRequest::get("/forbidden"), Metadata::new())
            .unwrap_err();
        assert!(matches!(err, HandlerError::Encoding(_)));
        assert_eq!(handler.pending_requests(), 0);
        assert!(handler.channel().sent().is_empty());
    }

    #[test]
    fn test_not_ready_refuses_send() {
        let (handler, recorder) = recorded();
        recorder.busy.store(true, Ordering::SeqCst);

        let err = handler.send(PendingRequest::get("/"), Metadata::new()).unwrap_err();
        assert_eq!(err, HandlerError::NotReady);
        assert!(recorder.events().is_empty());
        assert_eq!(handler.pending_requests(), 0);

        recorder.busy.store(false, Ordering::SeqCst);
        assert!(handler.send(PendingRequest::get("/"), Metadata::new()).is_ok());
    }

    #[test]
    fn test_session_manager_sees_lifecycle() {
        let (handler, recorder) = recorded();
        handler.on_open();
        handler.send(PendingRequest::get("/a"), Metadata::new()).unwrap();
        handler.on_receive(OK).unwrap();
        assert!(handler.on_receive(b"bogus\r\n").is_err());
        handler.on_close();

        let events = recorder.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[..3], ["open", "request /a", "response 200 /a"]);
        assert!(events[3].starts_with("error Malformed status line"));
        assert_eq!(events[4], "close");
    }

    #[test]
    fn test_failed_close_reported_to_session_manager() {
        let recorder = Arc::new(Recorder::default());
        let handler = HttpHandler::with_session_manager(
            Settings::default(),
            StuckChannel(MemoryChannel::new()),
            Arc::clone(&recorder),
        );
        handler.send(PendingRequest::get("/"), Metadata::new()).unwrap();
        let received = handler
            .on_receive(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n")
            .unwrap();

        assert_eq!(received.len(), 1);
        assert_eq!(
            recorder.events().last().map(String::as_str),
            Some("error Channel error: close refused")
        );
    }

    #[test]
    fn test_concurrent_sends_pair_in_channel_order() {
        const SENDERS: usize = 8;
        const PER_SENDER: usize = 25;

        let handler = Arc::new(handler(
            Settings::default().with_request_queue_size(SENDERS * PER_SENDER),
        ));

        let workers: Vec<_> = (0..SENDERS)
            .map(|sender| {
                let handler = Arc::clone(&handler);
                thread::spawn(move || {
                    for n in 0..PER_SENDER {
                        let target = format!("/s{}/{}", sender, n);
                        handler.send(PendingRequest::get(target), Metadata::new()).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let sent = handler.channel().sent();
        assert_eq!(sent.len(), SENDERS * PER_SENDER);
        for frame in &sent {
            let request_line = format!("GET {} HTTP/1.1\r\n", frame.metadata["uri"]);
            assert!(frame.data.starts_with(request_line.as_bytes()));
        }

        let input: Vec<u8> = OK.repeat(sent.len());
        let received = handler.on_receive(&input).unwrap();
        let paired: Vec<&str> = received
            .iter()
            .map(|r| r.metadata["uri"].as_str())
            .collect();
        let on_wire: Vec<&str> = sent.iter().map(|f| f.metadata["uri"].as_str()).collect();
        assert_eq!(paired, on_wire);
    }
}
