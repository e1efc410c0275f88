//! Socket abstraction and connectors
//!
//! A [`Socket`] is a text-frame sink plus a text-frame stream. The stream
//! ending means the peer closed the connection.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{Error, Result};

pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One established connection
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Socket {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<String, Error = Error> + Send + 'static,
        R: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens sockets for the connection actor.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Socket>;
}

/// WebSocket connector
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Socket> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Transport(format!("failed to connect to {}: {}", url, e)))?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| Error::Transport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, Error>(Message::Text(text))));

        // Control frames are answered by tungstenite itself
        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::warn!("Dropping non-UTF-8 binary frame");
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => Some(Err(Error::Transport(e.to_string()))),
            })
        });

        Ok(Socket::new(sink, stream))
    }
}

/// The server side of an in-memory socket
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<Result<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Deliver a text frame to the client.
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Ok(text.into()));
    }

    /// Raise a connection-level error on the client side.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.to_client.send(Err(Error::Transport(message.into())));
    }

    /// Next frame the client sent, if any.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Close the connection from the server side.
    pub fn close(self) {}
}

/// In-process connector: each dial takes the next socket queued with
/// [`MemoryConnector::accept`], or fails when none is queued.
#[derive(Default)]
pub struct MemoryConnector {
    queued: Mutex<VecDeque<Socket>>,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a socket for the next connection attempt.
    pub fn accept(&self) -> MemoryPeer {
        let (to_client, client_rx) = mpsc::unbounded_channel::<Result<String>>();
        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();

        let stream = futures_util::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let sink = futures_util::sink::unfold(client_tx, |tx, text: String| async move {
            tx.send(text)
                .map_err(|_| Error::Transport("peer closed".to_string()))?;
            Ok::<_, Error>(tx)
        });

        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(Socket::new(sink, stream));
        }
        MemoryPeer {
            to_client,
            from_client,
        }
    }

    /// Number of connection attempts so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _url: &str) -> Result<Socket> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.queued
            .lock()
            .ok()
            .and_then(|mut queued| queued.pop_front())
            .ok_or_else(|| Error::Transport("connection refused".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_socket_round_trip() {
        let connector = MemoryConnector::new();
        let mut peer = connector.accept();
        let mut socket = connector.connect("mem://").await.unwrap();

        peer.send("hello");
        assert_eq!(socket.stream.next().await.unwrap().unwrap(), "hello");

        socket.sink.send("ping".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("ping"));

        peer.close();
        assert!(socket.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_memory_connector_refuses_without_queue() {
        let connector = MemoryConnector::new();
        assert!(connector.connect("mem://").await.is_err());
        assert_eq!(connector.attempts(), 1);
    }
}
