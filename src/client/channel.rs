//! Connection collaborator interface.
//!
//! The handler never touches sockets. It consumes this narrow interface from
//! whatever framework owns the connection: hand off encoded bytes, query and
//! toggle the open state, and report the peer address.
//!
//! [`MemoryChannel`] is an in-memory implementation that records every frame
//! it is given. Tests and demos use it in place of a real connection.

use crate::error::{HandlerError, Result};
use crate::types::Metadata;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// How the framework routes a sent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Write the bytes as-is
    Direct,
    /// Pass the frame through the channel's handler only
    Handle,
    /// Pass the frame through the channel's manglers only
    Mangle,
    /// Handler first, then manglers
    #[default]
    HandleAndMangle,
}

/// Identifier the channel assigns to a sent frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the handler needs from the connection that owns it.
pub trait Channel: Send + Sync {
    /// Hand encoded bytes to the connection for transmission
    fn send(&self, data: Bytes, metadata: Metadata, mode: SendMode) -> Result<MessageId>;

    /// Whether the connection is open
    fn is_open(&self) -> bool;

    /// Open the connection
    fn open(&self) -> Result<()>;

    /// Close the connection
    fn close(&self) -> Result<()>;

    /// Peer address
    fn address(&self) -> SocketAddr;

    /// Whether the connection runs over TLS
    fn is_secure(&self) -> bool;
}

impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn send(&self, data: Bytes, metadata: Metadata, mode: SendMode) -> Result<MessageId> {
        (**self).send(data, metadata, mode)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn open(&self) -> Result<()> {
        (**self).open()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn address(&self) -> SocketAddr {
        (**self).address()
    }

    fn is_secure(&self) -> bool {
        (**self).is_secure()
    }
}

/// A frame recorded by [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Identifier returned to the sender
    pub id: MessageId,
    /// Encoded bytes
    pub data: Bytes,
    /// Metadata passed with the frame
    pub metadata: Metadata,
    /// Requested routing
    pub mode: SendMode,
}

/// In-memory channel that records sent frames.
///
/// Starts closed. Sending on a closed channel fails with
/// [`HandlerError::Channel`], as a real connection would.
///
/// # Examples
///
/// ```
/// use dirty_http_handler::client::{Channel, MemoryChannel, SendMode};
/// use dirty_http_handler::Metadata;
/// use bytes::Bytes;
///
/// let channel = MemoryChannel::new();
/// assert!(channel.send(Bytes::from_static(b"x"), Metadata::new(), SendMode::Direct).is_err());
///
/// channel.open().unwrap();
/// channel.send(Bytes::from_static(b"x"), Metadata::new(), SendMode::Direct).unwrap();
/// assert_eq!(channel.sent().len(), 1);
/// ```
#[derive(Debug)]
pub struct MemoryChannel {
    open: AtomicBool,
    secure: bool,
    address: SocketAddr,
    next_id: AtomicU64,
    sent: Mutex<Vec<SentFrame>>,
    opens: AtomicU64,
    closes: AtomicU64,
}

impl MemoryChannel {
    /// Closed, plain-text channel to `127.0.0.1:80`
    pub fn new() -> Self {
        Self::with_address(SocketAddr::from((Ipv4Addr::LOCALHOST, 80)), false)
    }

    /// Closed channel to `address`
    pub fn with_address(address: SocketAddr, secure: bool) -> Self {
        MemoryChannel {
            open: AtomicBool::new(false),
            secure,
            address,
            next_id: AtomicU64::new(1),
            sent: Mutex::new(Vec::new()),
            opens: AtomicU64::new(0),
            closes: AtomicU64::new(0),
        }
    }

    /// Every frame sent so far, in order
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    /// Concatenated bytes of every frame sent so far
    pub fn sent_bytes(&self) -> Bytes {
        let sent = self.sent.lock();
        let mut out = Vec::with_capacity(sent.iter().map(|f| f.data.len()).sum());
        for frame in sent.iter() {
            out.extend_from_slice(&frame.data);
        }
        Bytes::from(out)
    }

    /// Forget recorded frames
    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// How many times `open` succeeded
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// How many times `close` was called on an open channel
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MemoryChannel {
    fn send(&self, data: Bytes, metadata: Metadata, mode: SendMode) -> Result<MessageId> {
        if !self.is_open() {
            return Err(HandlerError::Channel(format!(
                "Connection to {} is not open",
                self.address
            )));
        }
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().push(SentFrame {
            id,
            data,
            metadata,
            mode,
        });
        Ok(id)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<()> {
        if !self.open.swap(true, Ordering::SeqCst) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    fn is_secure(&self) -> bool {
        self.secure
    }
}
