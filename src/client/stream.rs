//! Async response stream.
//!
//! Drives a [`ResponseDecoder`] from any [`AsyncRead`] on a spawned tokio task
//! and delivers decoded responses through an mpsc channel. The caller keeps
//! the write half of the connection; this only consumes bytes.
//!
//! # Termination
//!
//! | Event | Last item |
//! |-------|-----------|
//! | EOF between responses | none, the stream ends |
//! | EOF mid-response | `Err(HandlerError::Truncated)` |
//! | Fatal framing error | that error |
//! | Read error | `Err(HandlerError::Io)` |
//!
//! # Examples
//!
//! ```ignore
//! use dirty_http_handler::client::{ResponseStream, Settings};
//! use futures::StreamExt;
//!
//! let socket = tokio::net::TcpStream::connect("example.com:80").await?;
//! let (reader, mut writer) = socket.into_split();
//! let mut responses = ResponseStream::spawn(reader, &Settings::default());
//!
//! writer.write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").await?;
//! while let Some(response) = responses.next().await {
//!     println!("{}", response?);
//! }
//! ```

use crate::client::buffer::ByteStreamBuffer;
use crate::client::config::Settings;
use crate::client::parser::ResponseDecoder;
use crate::error::{HandlerError, Result};
use crate::types::DecodedResponse;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Channel capacity between the reader task and the consumer
const CHANNEL_CAPACITY: usize = 100;

/// Read buffer size per `read` call
const READ_CHUNK: usize = 8192;

/// Stream of responses decoded from a byte source.
pub struct ResponseStream {
    receiver: ReceiverStream<Result<DecodedResponse>>,
}

impl ResponseStream {
    /// Spawn a task that decodes responses from `reader`.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<R>(reader: R, settings: &Settings) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let decoder = ResponseDecoder::from_settings(settings);

        tokio::spawn(async move {
            pump(reader, decoder, tx).await;
        });

        ResponseStream::new(rx)
    }

    /// Wrap an existing receiver
    pub fn new(receiver: mpsc::Receiver<Result<DecodedResponse>>) -> Self {
        ResponseStream {
            receiver: ReceiverStream::new(receiver),
        }
    }
}

impl Stream for ResponseStream {
    type Item = Result<DecodedResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

async fn pump<R>(mut reader: R, mut decoder: ResponseDecoder, tx: mpsc::Sender<Result<DecodedResponse>>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = ByteStreamBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tx.send(Err(HandlerError::from(e))).await;
                return;
            }
        };

        if n == 0 {
            if decoder.has_partial_message() || !buffer.is_empty() {
                tracing::warn!("Stream ended with {} bytes of an incomplete response", buffer.len());
                let _ = tx.send(Err(HandlerError::Truncated(buffer.len()))).await;
            }
            return;
        }

        buffer.append(&chunk[..n]);

        loop {
            match decoder.try_parse(&mut buffer) {
                Ok(Some(response)) => {
                    if tx.send(Ok(response)).await.is_err() {
                        return; // Receiver dropped
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}
