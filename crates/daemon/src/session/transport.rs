// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent transport abstraction.
//!
//! A transport is a bidirectional stream of text frames. The session owns
//! the read side; everything that needs to push frames (dispatcher,
//! heartbeat, log router, shutdown broadcast) holds a cloned
//! [`TransportSender`]. Closing the sender tears the whole connection down:
//! the write task stops and `recv` returns `None`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SEND_BUFFER: usize = 64;

#[derive(Debug, Error)]
#[error("transport closed")]
pub struct TransportClosed;

/// Clonable write-side handle to an agent connection.
#[derive(Clone)]
pub struct TransportSender {
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
}

impl TransportSender {
    /// A sender plus the receiver the transport drains frames from.
    pub fn channel() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SEND_BUFFER);
        (Self { tx, closed: CancellationToken::new() }, rx)
    }

    pub async fn send(&self, frame: String) -> Result<(), TransportClosed> {
        if self.closed.is_cancelled() {
            return Err(TransportClosed);
        }
        self.tx.send(frame).await.map_err(|_| TransportClosed)
    }

    /// Close the connection. Idempotent; wakes the read loop.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// A live agent connection the session can read frames from.
#[async_trait]
pub trait Transport: Send + 'static {
    /// The write-side handle stored in the connection registry.
    fn sender(&self) -> TransportSender;

    /// Next text frame, or `None` once the connection is gone (peer close,
    /// error, or local [`TransportSender::close`]).
    async fn recv(&mut self) -> Option<String>;
}

/// WebSocket transport for real agents.
pub struct WsTransport {
    stream: futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    sender: TransportSender,
}

impl WsTransport {
    pub fn new(ws: WebSocketStream<TcpStream>) -> Self {
        let (mut sink, stream) = ws.split();
        let (sender, mut rx) = TransportSender::channel();
        let closed = sender.closed_token();

        // Write task: drains queued frames until the connection closes.
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    frame = rx.recv() => match frame {
                        Some(frame) => {
                            if sink.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Self { stream, sender }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    async fn recv(&mut self) -> Option<String> {
        let closed = self.sender.closed_token();
        loop {
            tokio::select! {
                _ = closed.cancelled() => return None,
                msg = self.stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "agent sent close frame");
                        self.sender.close();
                        return None;
                    }
                    Some(Ok(_)) => continue, // Ping/Pong/Binary frames are ignored
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read error");
                        self.sender.close();
                        return None;
                    }
                    None => {
                        self.sender.close();
                        return None;
                    }
                },
            }
        }
    }
}

/// In-memory transport for tests: the daemon side.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeTransport {
    inbound: mpsc::UnboundedReceiver<String>,
    sender: TransportSender,
}

/// In-memory transport for tests: the agent side.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeAgent {
    to_daemon: mpsc::UnboundedSender<String>,
    from_daemon: mpsc::Receiver<String>,
    closed: CancellationToken,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeTransport {
    /// A connected (daemon, agent) pair.
    pub fn pair() -> (FakeTransport, FakeAgent) {
        let (to_daemon, inbound) = mpsc::unbounded_channel();
        let (sender, from_daemon) = TransportSender::channel();
        let closed = sender.closed_token();
        (FakeTransport { inbound, sender }, FakeAgent { to_daemon, from_daemon, closed })
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Transport for FakeTransport {
    fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    async fn recv(&mut self) -> Option<String> {
        let closed = self.sender.closed_token();
        tokio::select! {
            _ = closed.cancelled() => None,
            frame = self.inbound.recv() => frame,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl FakeAgent {
    /// Send a protocol message to the daemon.
    pub fn send<T: serde::Serialize>(&self, msg: &T) {
        if let Ok(frame) = serde_json::to_string(msg) {
            self.send_raw(frame);
        }
    }

    /// Send an arbitrary frame (for malformed-input tests).
    pub fn send_raw(&self, frame: String) {
        let _ = self.to_daemon.send(frame);
    }

    /// Next frame the daemon sent, or `None` when the connection is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            frame = self.from_daemon.recv() => frame,
            _ = self.closed.cancelled() => self.from_daemon.try_recv().ok(),
        }
    }

    /// Next frame parsed as JSON.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        self.recv().await.and_then(|frame| serde_json::from_str(&frame).ok())
    }

    /// Drop the connection from the agent side.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
