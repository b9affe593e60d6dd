use crate::config::ClientConfig;
use crate::envelope::{Envelope, EventKind, Outbound};
use crate::error::{ErrorEvent, ErrorKind};
use crate::events::{EventBus, ListenerId};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Connection readiness, derived from the live transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport exists
    Disconnected,
    /// Handshake in flight
    Connecting,
    /// Transport open, frames flowing
    Connected,
    /// Explicit disconnect in progress
    Closing,
}

/// Bus key selecting which events a listener receives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Transport opened
    Connected,
    /// Transport closed (any reason)
    Disconnected,
    /// A categorized, locally-recovered error
    Error,
    /// Catch-all: every decoded envelope
    Message,
    /// Envelopes of one specific kind
    Event(EventKind),
}

/// Payload delivered to bus listeners
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Lifecycle transition, nothing attached
    None,
    /// The `data` field of a decoded envelope (typed subscriptions)
    Data(Value),
    /// A full decoded envelope (catch-all subscriptions)
    Envelope(Envelope),
    /// A categorized connection error
    Error(ErrorEvent),
}

/// Read-only snapshot of the reconnection bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectionInfo {
    /// Whether an automatic reconnection is pending or in progress
    pub is_reconnecting: bool,
    /// Consecutive failed attempts since the last successful open
    pub attempts: u32,
    /// Configured attempt ceiling
    pub max_attempts: u32,
}

/// Owns one WebSocket transport at a time: connect/disconnect, reconnect
/// scheduling with exponential backoff, envelope decoding and dispatch.
///
/// Cheap to clone; clones share the same session. All failures are
/// recovered locally and surfaced as `Topic::Error` events — `connect()`
/// and `send()` never return errors.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    config: ClientConfig,
    bus: EventBus<Topic, EventPayload>,
    state: parking_lot::Mutex<ConnectionState>,
    /// Write half of the transport; `None` when disconnected.
    /// tokio Mutex because sends cross an await point.
    writer: tokio::sync::Mutex<Option<WsSink>>,
    /// Guard against duplicate concurrent connect attempts
    is_connecting: AtomicBool,
    /// True while automatic reconnection is wanted; cleared by disconnect()
    should_reconnect: AtomicBool,
    /// Set once the attempt ceiling is reached
    gave_up: AtomicBool,
    reconnect_attempts: AtomicU32,
    /// Session generation. Bumped by disconnect() so pending reconnect
    /// timers and the read task's epilogue become no-ops.
    epoch: AtomicU64,
    read_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager for `url`. No connection is made until `connect()`.
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                bus: EventBus::new(),
                state: parking_lot::Mutex::new(ConnectionState::Disconnected),
                writer: tokio::sync::Mutex::new(None),
                is_connecting: AtomicBool::new(false),
                should_reconnect: AtomicBool::new(false),
                gave_up: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                epoch: AtomicU64::new(0),
                read_task: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Register a listener on this session's bus.
    ///
    /// Listeners live as long as this manager instance.
    pub fn on(
        &self,
        topic: Topic,
        callback: impl Fn(&EventPayload) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.bus.on(topic, callback)
    }

    /// Remove a listener registration
    pub fn off(&self, topic: &Topic, id: ListenerId) -> bool {
        self.inner.bus.off(topic, id)
    }

    /// Current connection state; `Disconnected` when no transport exists
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether the transport is currently open
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Snapshot of the reconnection bookkeeping
    pub fn reconnection_info(&self) -> ReconnectionInfo {
        let attempts = self.inner.reconnect_attempts.load(Ordering::Acquire);
        let is_reconnecting = attempts > 0
            && self.inner.should_reconnect.load(Ordering::Acquire)
            && !self.inner.gave_up.load(Ordering::Acquire)
            && self.state() != ConnectionState::Connected;
        ReconnectionInfo {
            is_reconnecting,
            attempts,
            max_attempts: self.inner.config.max_reconnect_attempts,
        }
    }

    /// Open the transport.
    ///
    /// Idempotent: a call while a connect is already in flight, or while
    /// connected, is a no-op. A fresh explicit call restores the full
    /// reconnection budget, including after the attempt ceiling was hit.
    /// Failures emit a `Topic::Error` event and feed the reconnect
    /// scheduler; nothing is returned to the caller.
    pub async fn connect(&self) {
        self.inner.reconnect_attempts.store(0, Ordering::Release);
        self.inner.gave_up.store(false, Ordering::Release);
        self.dial().await;
    }

    /// One dial attempt. Shared by `connect()` and the reconnect timers,
    /// which must not touch the attempt counter.
    async fn dial(&self) {
        if self.inner.is_connecting.swap(true, Ordering::AcqRel) {
            debug!("connect() ignored, attempt already in flight");
            return;
        }
        if self.state() == ConnectionState::Connected {
            self.inner.is_connecting.store(false, Ordering::Release);
            debug!("connect() ignored, already connected");
            return;
        }

        self.inner.should_reconnect.store(true, Ordering::Release);
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        self.set_state(ConnectionState::Connecting);
        info!(url = %self.inner.url, "connecting");

        let handshake = timeout(
            self.inner.config.connect_timeout,
            connect_async(self.inner.url.as_str()),
        )
        .await;

        let stream = match handshake {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                self.inner.is_connecting.store(false, Ordering::Release);
                self.set_state(ConnectionState::Disconnected);
                let kind = match &e {
                    tungstenite::Error::Url(_) => ErrorKind::Creation,
                    _ => ErrorKind::Connection,
                };
                self.emit_error(kind, e.to_string());
                self.schedule_reconnect();
                return;
            }
            Err(_) => {
                self.inner.is_connecting.store(false, Ordering::Release);
                self.set_state(ConnectionState::Disconnected);
                self.emit_error(
                    ErrorKind::Connection,
                    format!(
                        "handshake timed out after {:?}",
                        self.inner.config.connect_timeout
                    ),
                );
                self.schedule_reconnect();
                return;
            }
        };

        // A disconnect() may have landed while the handshake was in
        // flight; the epoch bump makes this dial stale. The fresh
        // transport must not be installed behind the caller's back.
        if self.inner.epoch.load(Ordering::Acquire) != epoch
            || !self.inner.should_reconnect.load(Ordering::Acquire)
        {
            self.inner.is_connecting.store(false, Ordering::Release);
            debug!("handshake completed after disconnect, dropping transport");
            let mut stream = stream;
            let _ = stream.close(None).await;
            return;
        }

        let (write, read) = stream.split();
        *self.inner.writer.lock().await = Some(write);
        self.inner.reconnect_attempts.store(0, Ordering::Release);
        self.inner.gave_up.store(false, Ordering::Release);
        self.set_state(ConnectionState::Connected);
        self.inner.is_connecting.store(false, Ordering::Release);
        info!(url = %self.inner.url, "connected");
        self.inner.bus.emit(&Topic::Connected, &EventPayload::None);

        let session = self.clone();
        let handle = tokio::spawn(async move { session.read_loop(read, epoch).await });
        if let Some(stale) = self.inner.read_task.lock().replace(handle) {
            stale.abort();
        }
    }

    /// Close the transport and cancel any intent to reconnect.
    ///
    /// `should_reconnect` is cleared first, so a reconnect timer that
    /// races this call re-checks the flag and does nothing. Terminal for
    /// this manager instance until `connect()` is called again.
    pub async fn disconnect(&self) {
        self.inner.should_reconnect.store(false, Ordering::Release);
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.set_state(ConnectionState::Closing);
        info!("disconnecting");

        if let Some(mut sink) = self.inner.writer.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
        if let Some(task) = self.inner.read_task.lock().take() {
            task.abort();
        }

        self.set_state(ConnectionState::Disconnected);
    }

    /// Write one message to the transport.
    ///
    /// Fire-and-forget with a boolean outcome: `true` only if the
    /// transport is open and the write did not raise. Failures emit a
    /// `Topic::Error` event with kind `Send` and return `false`.
    pub async fn send(&self, message: impl Into<Outbound>) -> bool {
        let text = match message.into().into_text() {
            Ok(text) => text,
            Err(e) => {
                self.emit_error(ErrorKind::Send, e.to_string());
                return false;
            }
        };

        if self.state() != ConnectionState::Connected {
            self.emit_error(ErrorKind::Send, "no open connection");
            return false;
        }

        let mut writer = self.inner.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => match sink.send(Message::Text(text)).await {
                Ok(()) => true,
                Err(e) => {
                    self.emit_error(ErrorKind::Send, e.to_string());
                    false
                }
            },
            None => {
                self.emit_error(ErrorKind::Send, "no open connection");
                false
            }
        }
    }

    async fn read_loop(self, mut read: SplitStream<WsStream>, epoch: u64) {
        while let Some(frame) = read.next().await {
            if self.inner.epoch.load(Ordering::Acquire) != epoch {
                return;
            }
            match frame {
                Ok(Message::Text(text)) => self.handle_frame(&text),
                Ok(Message::Binary(data)) => {
                    warn!(len = data.len(), "ignoring unexpected binary frame");
                }
                Ok(Message::Close(_)) => {
                    info!("received close frame");
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => {
                    self.emit_error(ErrorKind::Connection, e.to_string());
                    break;
                }
            }
        }

        // An explicit disconnect() already tore the session down.
        if self.inner.epoch.load(Ordering::Acquire) != epoch {
            return;
        }

        self.inner.writer.lock().await.take();
        self.set_state(ConnectionState::Disconnected);
        info!("connection closed");
        self.inner
            .bus
            .emit(&Topic::Disconnected, &EventPayload::None);

        if self.inner.should_reconnect.load(Ordering::Acquire) {
            self.schedule_reconnect();
        }
    }

    /// Decode one inbound text frame and dispatch it.
    ///
    /// Typed listeners get `envelope.data`; catch-all listeners get the
    /// full envelope. Undecodable frames become one `Parse` error event
    /// and are dropped — the connection stays up.
    fn handle_frame(&self, raw: &str) {
        match serde_json::from_str::<Envelope>(raw) {
            Ok(envelope) => {
                if let EventKind::Unknown(name) = &envelope.kind {
                    debug!(kind = %name, "frame with unrecognized type");
                }
                self.inner.bus.emit(
                    &Topic::Event(envelope.kind.clone()),
                    &EventPayload::Data(envelope.data.clone()),
                );
                self.inner
                    .bus
                    .emit(&Topic::Message, &EventPayload::Envelope(envelope));
            }
            Err(e) => self.emit_error(ErrorKind::Parse, e.to_string()),
        }
    }

    /// Schedule the next reconnection attempt, unless the ceiling is hit.
    ///
    /// The timer callback re-checks `should_reconnect` and the session
    /// epoch before dialing — cancellation is cooperative, not preemptive.
    fn schedule_reconnect(&self) {
        if !self.inner.should_reconnect.load(Ordering::Acquire) {
            return;
        }

        let attempts = self.inner.reconnect_attempts.load(Ordering::Acquire);
        if attempts >= self.inner.config.max_reconnect_attempts {
            self.inner.gave_up.store(true, Ordering::Release);
            warn!(attempts, "max reconnection attempts reached, giving up");
            return;
        }

        let attempt = attempts + 1;
        self.inner.reconnect_attempts.store(attempt, Ordering::Release);
        let delay = self.inner.config.reconnect_delay(attempt);
        debug!(attempt, ?delay, "scheduling reconnect");

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let session = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !session.inner.should_reconnect.load(Ordering::Acquire) {
                debug!("reconnect cancelled");
                return;
            }
            if session.inner.epoch.load(Ordering::Acquire) != epoch {
                return;
            }
            session.dial().await;
        });
    }

    fn emit_error(&self, kind: ErrorKind, message: impl Into<String>) {
        let event = ErrorEvent::new(kind, message);
        warn!(kind = %event.kind, message = %event.message, "connection error");
        self.inner
            .bus
            .emit(&Topic::Error, &EventPayload::Error(event));
    }

    fn set_state(&self, next: ConnectionState) {
        *self.inner.state.lock() = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_initial_state_is_disconnected() {
        let manager = ConnectionManager::new("ws://127.0.0.1:1/ws", ClientConfig::default());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());

        let info = manager.reconnection_info();
        assert!(!info.is_reconnecting);
        assert_eq!(info.attempts, 0);
        assert_eq!(info.max_attempts, 10);
    }

    #[tokio::test]
    async fn test_send_without_transport_returns_false_and_emits_send_error() {
        let manager = ConnectionManager::new("ws://127.0.0.1:1/ws", ClientConfig::default());

        let errors: Arc<Mutex<Vec<ErrorEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        manager.on(Topic::Error, move |payload| {
            if let EventPayload::Error(event) = payload {
                sink.lock().push(event.clone());
            }
        });

        assert!(!manager.send("hello").await);

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Send);
    }

    #[tokio::test]
    async fn test_disconnect_without_transport_is_safe() {
        let manager = ConnectionManager::new("ws://127.0.0.1:1/ws", ClientConfig::default());
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_listener_registration_and_removal() {
        let manager = ConnectionManager::new("ws://127.0.0.1:1/ws", ClientConfig::default());
        let id = manager.on(Topic::Event(EventKind::Status), |_| {});
        assert!(manager.off(&Topic::Event(EventKind::Status), id));
        assert!(!manager.off(&Topic::Event(EventKind::Status), id));
    }
}
