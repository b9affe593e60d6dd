use crate::config::ClientConfig;
use crate::connection::{
    ConnectionManager, ConnectionState, EventPayload, ReconnectionInfo, Topic,
};
use crate::envelope::{EventKind, Outbound};
use crate::error::Error;
use crate::events::EventBus;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::debug;
use url::Url;

/// Fan-out bus key; there is only one coarse transition stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConnectionChange;

/// Application-wide connection context: one shared session, reconnect-safe.
///
/// This is the composition-root object components receive by handle
/// instead of reaching for ambient global state. It owns at most one
/// [`ConnectionManager`] at a time and a fan-out registry of coarse
/// connected/disconnected observers that survives session replacement.
///
/// Cheap to clone; clones share the same session slot and observers.
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Shared>,
}

struct Shared {
    endpoint: String,
    config: ClientConfig,
    /// The current session, if any. Replaced only when not connected.
    manager: RwLock<Option<ConnectionManager>>,
    /// Coarse transition observers; kept separate from any manager's
    /// internal bus so they outlive session replacement.
    fanout: EventBus<ConnectionChange, bool>,
    /// Last value observers were told, for transition de-duplication
    last_notified: Mutex<Option<bool>>,
}

impl Shared {
    /// Tell observers about a transition, once per logical change
    fn notify(&self, connected: bool) {
        {
            let mut last = self.last_notified.lock();
            if *last == Some(connected) {
                return;
            }
            *last = Some(connected);
        }
        self.fanout.emit(&ConnectionChange, &connected);
    }
}

impl WsClient {
    /// Create a client for a `ws://` or `wss://` endpoint.
    ///
    /// No connection is made until [`connect()`](Self::connect).
    pub fn new(endpoint: impl Into<String>, config: ClientConfig) -> Result<Self, Error> {
        let endpoint = endpoint.into();
        let url = Url::parse(&endpoint)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        }
        Ok(Self {
            inner: Arc::new(Shared {
                endpoint,
                config,
                manager: RwLock::new(None),
                fanout: EventBus::new(),
                last_notified: Mutex::new(None),
            }),
        })
    }

    /// Create a client from an HTTP(S) page origin, using the `/ws` path
    pub fn for_origin(origin: &str, config: ClientConfig) -> Result<Self, Error> {
        Self::new(endpoint_for_origin(origin)?, config)
    }

    /// The endpoint this client dials
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Establish the shared connection.
    ///
    /// No-op if the current session is already connected. A stale session
    /// (existing but not connected) is torn down fully before a fresh one
    /// is created. Fan-out bridge listeners are wired before the new
    /// session dials, so observers never miss the first transition.
    pub async fn connect(&self) {
        let existing = self.inner.manager.read().clone();
        if let Some(manager) = existing {
            if manager.is_connected() {
                debug!("connect() ignored, session already healthy");
                return;
            }
            debug!("tearing down stale session before reconnect");
            manager.disconnect().await;
        }

        let manager = ConnectionManager::new(&self.inner.endpoint, self.inner.config.clone());

        // Weak back-references: the session must not keep the client alive.
        let shared: Weak<Shared> = Arc::downgrade(&self.inner);
        manager.on(Topic::Connected, {
            let shared = shared.clone();
            move |_| {
                if let Some(shared) = shared.upgrade() {
                    shared.notify(true);
                }
            }
        });
        manager.on(Topic::Disconnected, move |_| {
            if let Some(shared) = shared.upgrade() {
                shared.notify(false);
            }
        });

        *self.inner.manager.write() = Some(manager.clone());
        manager.connect().await;
    }

    /// Tear down the shared connection.
    ///
    /// Observers are notified `false` immediately, without waiting for the
    /// close handshake; the session reference is discarded so the next
    /// `connect()` starts fresh.
    pub async fn disconnect(&self) {
        let manager = self.inner.manager.write().take();
        let Some(manager) = manager else {
            return;
        };
        self.inner.notify(false);
        manager.disconnect().await;
    }

    /// Forward a message to the current session.
    ///
    /// `false` when no session exists or the session's transport is not
    /// open; never panics, never returns an error.
    pub async fn send(&self, message: impl Into<Outbound>) -> bool {
        let manager = self.inner.manager.read().clone();
        match manager {
            Some(manager) => manager.send(message).await,
            None => {
                debug!("send() with no active session");
                false
            }
        }
    }

    /// Current connection state; `Disconnected` when no session exists
    pub fn state(&self) -> ConnectionState {
        self.inner
            .manager
            .read()
            .as_ref()
            .map(|manager| manager.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Whether the shared connection is currently open
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnection bookkeeping; all-zero/false when no session exists
    pub fn reconnection_info(&self) -> ReconnectionInfo {
        self.inner
            .manager
            .read()
            .as_ref()
            .map(|manager| manager.reconnection_info())
            .unwrap_or_default()
    }

    /// Observe coarse connected/disconnected transitions.
    ///
    /// Observers receive `true` once per successful open and `false` once
    /// per logical close or disconnect, independent of how many reconnect
    /// attempts happen in between. The returned closure unsubscribes.
    pub fn on_connection_change(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> impl FnOnce() + Send {
        let id = self
            .inner
            .fanout
            .on(ConnectionChange, move |connected| callback(*connected));
        let shared = Arc::clone(&self.inner);
        move || {
            shared.fanout.off(&ConnectionChange, id);
        }
    }

    /// Subscribe to one envelope kind on the current session.
    ///
    /// Listeners receive the envelope's `data` payload and are scoped to
    /// the session's lifetime. Returns `None` when no session exists. The
    /// returned closure unsubscribes.
    pub fn on(
        &self,
        kind: EventKind,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Option<impl FnOnce() + Send> {
        let manager = self.inner.manager.read().clone()?;
        let id = manager.on(Topic::Event(kind.clone()), move |payload| {
            if let EventPayload::Data(value) = payload {
                callback(value);
            }
        });
        let topic = Topic::Event(kind);
        Some(move || {
            manager.off(&topic, id);
        })
    }
}

/// Derive the WebSocket endpoint from a hosting page's origin:
/// `http → ws`, `https → wss`, path `/ws`, query and fragment dropped.
pub fn endpoint_for_origin(origin: &str) -> Result<String, Error> {
    let mut url = Url::parse(origin)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::UnsupportedScheme(scheme.to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}
