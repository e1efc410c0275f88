//! Transport connection
//!
//! A connection actor owns the single streaming connection to the engine.
//! It is driven by [`TransportCommand`]s and reports [`TransportEvent`]s; no
//! state is shared with callers other than a watch of the lifecycle state.
//!
//! ```text
//!            Connect                    opened
//!   Idle ───────────────► Connecting ─────────────► Open
//!    ▲  ▲                     │ failed                │ closed / error
//!    │  └── retry timer ◄─────┴───────────────────────┘
//!    │                                                │ Disconnect
//!    └──────────────────────── Closing ◄──────────────┘
//! ```
//!
//! After an unexpected close (or a failed attempt) exactly one retry timer is
//! armed. [`TransportHandle::disconnect`] cancels it and turns auto-reconnect
//! off until the next [`TransportHandle::connect`].

mod socket;

pub use socket::{
    Connector, FrameSink, FrameStream, MemoryConnector, MemoryPeer, Socket, TungsteniteConnector,
};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Sleep};
use tracing::Instrument;

use crate::error::Result;

/// Lifecycle state of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Connect,
    Disconnect,
    Send(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    /// Error on a live connection
    Error(String),
    Closed,
}

/// Control side of a connection actor
#[derive(Debug, Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<TransportCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl TransportHandle {
    /// Open the connection. No-op while connecting or open.
    pub fn connect(&self) {
        self.command(TransportCommand::Connect);
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.command(TransportCommand::Disconnect);
    }

    /// Send a text frame. Dropped with a warning when not open.
    pub fn send(&self, text: impl Into<String>) {
        self.command(TransportCommand::Send(text.into()));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn command(&self, command: TransportCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Transport actor has stopped");
        }
    }
}

/// Spawn a connection actor for `url`.
///
/// The actor stops when every [`TransportHandle`] is dropped.
pub fn spawn(
    connector: Arc<dyn Connector>,
    url: impl Into<String>,
    reconnect_delay: Duration,
) -> (TransportHandle, mpsc::UnboundedReceiver<TransportEvent>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

    let url = url.into();
    let span = tracing::info_span!("transport", url = %url);
    let actor = ConnectionActor {
        connector,
        url,
        reconnect_delay,
        commands: command_rx,
        events: event_tx,
        state: state_tx,
        auto_reconnect: false,
        socket: None,
        dialing: None,
        retry: None,
    };
    tokio::spawn(actor.run().instrument(span));

    (
        TransportHandle {
            commands: command_tx,
            state: state_rx,
        },
        event_rx,
    )
}

struct ConnectionActor {
    connector: Arc<dyn Connector>,
    url: String,
    reconnect_delay: Duration,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: watch::Sender<ConnectionState>,
    auto_reconnect: bool,
    socket: Option<Socket>,
    dialing: Option<BoxFuture<'static, Result<Socket>>>,
    /// The single pending reconnect timer
    retry: Option<Pin<Box<Sleep>>>,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                dialed = poll_slot(&mut self.dialing) => {
                    self.dialing = None;
                    self.on_dialed(dialed);
                }
                frame = next_frame(&mut self.socket) => self.on_frame(frame),
                _ = poll_slot(&mut self.retry) => {
                    self.retry = None;
                    tracing::info!(url = %self.url, "Attempting to reconnect");
                    self.dial();
                }
            }
        }

        self.close_socket().await;
        tracing::debug!("Transport actor stopped");
    }

    async fn handle_command(&mut self, command: TransportCommand) {
        match command {
            TransportCommand::Connect => {
                self.auto_reconnect = true;
                if self.socket.is_some() || self.dialing.is_some() {
                    tracing::debug!(state = self.current().as_str(), "Connect ignored");
                    return;
                }
                self.retry = None;
                self.dial();
            }
            TransportCommand::Disconnect => {
                self.auto_reconnect = false;
                self.retry = None;
                self.dialing = None;
                self.close_socket().await;
                self.set_state(ConnectionState::Idle);
            }
            TransportCommand::Send(text) => match self.socket.as_mut() {
                Some(socket) => {
                    if let Err(e) = socket.sink.send(text).await {
                        tracing::warn!(error = %e, "Failed to send frame");
                    }
                }
                None => tracing::warn!(state = self.current().as_str(), "Dropping frame, connection not open"),
            },
        }
    }

    fn dial(&mut self) {
        if self.socket.is_some() || self.dialing.is_some() {
            return;
        }
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        self.dialing = Some(Box::pin(async move { connector.connect(&url).await }));
        self.set_state(ConnectionState::Connecting);
    }

    fn on_dialed(&mut self, dialed: Result<Socket>) {
        match dialed {
            Ok(socket) => {
                tracing::info!(url = %self.url, "Connected");
                self.socket = Some(socket);
                self.set_state(ConnectionState::Open);
                self.emit(TransportEvent::Opened);
            }
            Err(e) => {
                // A failed attempt is not an error on a live connection
                tracing::warn!(url = %self.url, error = %e, "Connection attempt failed");
                self.set_state(ConnectionState::Idle);
                self.schedule_reconnect();
            }
        }
    }

    fn on_frame(&mut self, frame: Option<Result<String>>) {
        match frame {
            Some(Ok(text)) => self.emit(TransportEvent::Frame(text)),
            Some(Err(e)) => {
                if self.current() == ConnectionState::Open {
                    tracing::error!(error = %e, "Connection error");
                    self.emit(TransportEvent::Error(e.to_string()));
                }
                self.on_closed();
            }
            None => self.on_closed(),
        }
    }

    fn on_closed(&mut self) {
        tracing::info!(url = %self.url, "Disconnected");
        self.socket = None;
        self.set_state(ConnectionState::Idle);
        self.emit(TransportEvent::Closed);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect {
            return;
        }
        // Replacing the slot keeps at most one timer pending
        self.retry = Some(Box::pin(tokio::time::sleep_until(
            Instant::now() + self.reconnect_delay,
        )));
        tracing::debug!(delay = ?self.reconnect_delay, "Reconnect scheduled");
    }

    async fn close_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            self.set_state(ConnectionState::Closing);
            if let Err(e) = socket.sink.close().await {
                tracing::debug!(error = %e, "Error while closing, ignored");
            }
            self.emit(TransportEvent::Closed);
        }
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

/// Await the future in `slot`, or never resolve when it is empty.
async fn poll_slot<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// Next item from the open socket, or never resolve when there is none.
async fn next_frame(socket: &mut Option<Socket>) -> Option<Result<String>> {
    match socket.as_mut() {
        Some(socket) => socket.stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(3);

    async fn expect_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(60), events.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("transport actor stopped")
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_receive_frames() {
        let connector = MemoryConnector::new();
        let mut peer = connector.accept();
        let (handle, mut events) = spawn(connector.clone(), "mem://", DELAY);

        handle.connect();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);
        assert_eq!(handle.state(), ConnectionState::Open);

        peer.send(r#"{"type":"GLOBAL_INIT"}"#);
        assert_eq!(
            expect_event(&mut events).await,
            TransportEvent::Frame(r#"{"type":"GLOBAL_INIT"}"#.to_string())
        );

        handle.send("hello");
        assert_eq!(peer.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let connector = MemoryConnector::new();
        let _peer = connector.accept();
        let (handle, mut events) = spawn(connector.clone(), "mem://", DELAY);

        handle.connect();
        handle.connect();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);
        handle.connect();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_unexpected_close() {
        let connector = MemoryConnector::new();
        let peer = connector.accept();
        let _second = connector.accept();
        let (handle, mut events) = spawn(connector.clone(), "mem://", DELAY);

        handle.connect();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);

        let closed_at = Instant::now();
        peer.close();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Closed);
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);
        assert!(closed_at.elapsed() >= DELAY);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = MemoryConnector::new();
        let peer = connector.accept();
        let _unused = connector.accept();
        let (handle, mut events) = spawn(connector.clone(), "mem://", DELAY);

        handle.connect();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);
        peer.close();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Closed);

        // Timer is pending now
        handle.disconnect();
        tokio::time::sleep(DELAY * 4).await;

        assert_eq!(connector.attempts(), 1);
        assert_eq!(handle.state(), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_retry_indefinitely() {
        let connector = MemoryConnector::new();
        let (handle, mut events) = spawn(connector.clone(), "mem://", DELAY);

        handle.connect();
        tokio::time::sleep(DELAY * 3 + Duration::from_millis(100)).await;
        assert_eq!(connector.attempts(), 4);

        let _peer = connector.accept();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);
        assert_eq!(connector.attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_error_is_reported_then_reconnects() {
        let connector = MemoryConnector::new();
        let peer = connector.accept();
        let _second = connector.accept();
        let (handle, mut events) = spawn(connector.clone(), "mem://", DELAY);

        handle.connect();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);
        peer.fail("reset by peer");
        assert_eq!(
            expect_event(&mut events).await,
            TransportEvent::Error("transport error: reset by peer".to_string())
        );
        assert_eq!(expect_event(&mut events).await, TransportEvent::Closed);
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_emits_closed_without_error() {
        let connector = MemoryConnector::new();
        let _peer = connector.accept();
        let (handle, mut events) = spawn(connector.clone(), "mem://", DELAY);

        handle.connect();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Opened);
        handle.disconnect();
        assert_eq!(expect_event(&mut events).await, TransportEvent::Closed);
        tokio::time::sleep(DELAY * 2).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_when_not_open_is_dropped() {
        let connector = MemoryConnector::new();
        let (handle, _events) = spawn(connector.clone(), "mem://", DELAY);
        handle.send("lost");
        tokio::task::yield_now().await;
        assert_eq!(handle.state(), ConnectionState::Idle);
    }
}
