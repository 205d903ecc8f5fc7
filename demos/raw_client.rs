//! Raw TCP client driven by the handler
//!
//! Opens a plain TCP connection, sends a GET request through `HttpHandler`,
//! and prints responses as a `ResponseStream` decodes them off the read half.
//!
//! Run with: cargo run --example raw_client -- example.com 80 /

use anyhow::{Context, Result};
use bytes::Bytes;
use dirty_http_handler::client::{Channel, HttpHandler, MessageId, ResponseStream, SendMode, Settings};
use dirty_http_handler::{HandlerError, Metadata, PendingRequest};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Channel that queues frames for a writer task owning the socket's write half
struct TcpChannel {
    address: SocketAddr,
    frames: mpsc::UnboundedSender<Bytes>,
    open: AtomicBool,
    next_id: AtomicU64,
}

impl Channel for TcpChannel {
    fn send(&self, data: Bytes, _metadata: Metadata, _mode: SendMode) -> dirty_http_handler::Result<MessageId> {
        self.frames
            .send(data)
            .map_err(|_| HandlerError::Channel("writer task stopped".to_string()))?;
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn open(&self) -> dirty_http_handler::Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> dirty_http_handler::Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn address(&self) -> SocketAddr {
        self.address
    }

    fn is_secure(&self) -> bool {
        false
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "example.com".to_string());
    let port: u16 = args.next().map(|p| p.parse()).transpose()?.unwrap_or(80);
    let path = args.next().unwrap_or_else(|| "/".to_string());

    println!("Raw HTTP Client Example");
    println!("=======================\n");

    let socket = TcpStream::connect((host.as_str(), port))
        .await
        .with_context(|| format!("connecting to {}:{}", host, port))?;
    let address = socket.peer_addr()?;
    let (reader, mut writer) = socket.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                return;
            }
        }
    });

    let settings = Settings::default()
        .with_host(host.clone(), port)
        .with_default_header("Accept-Encoding", "gzip")
        .with_default_header("Accept-Encoding", "deflate")
        .with_default_header("User-Agent", "dirty-http-handler");
    let mut responses = ResponseStream::spawn(reader, &settings);

    let channel = TcpChannel {
        address,
        frames: tx,
        open: AtomicBool::new(true),
        next_id: AtomicU64::new(1),
    };
    let handler = HttpHandler::new(settings, channel);

    let id = handler.send(
        PendingRequest::get(path.clone()).with_header("Connection", "close"),
        Metadata::new(),
    )?;
    println!("Sent GET {} to {} as {}", path, address, id);

    while let Some(response) = responses.next().await {
        let response = response?;
        println!("\n{}", response);
        for (name, value) in response.headers.iter() {
            println!("  {}: {}", name, value);
        }
        if let Some(err) = &response.decoding_error {
            println!("  (body not decoded: {})", err);
        }
        println!("  body: {} bytes", response.body.len());
    }

    println!("\nConnection closed by peer");
    Ok(())
}
