//! # ws-reconnect-client
//!
//! A reconnecting WebSocket client with exponential backoff and typed
//! event dispatch.
//!
//! ## Features
//!
//! - **Auto-reconnection** with exponential backoff and a configurable cap
//! - **Cooperative cancellation** - an explicit disconnect stops pending
//!   reconnect timers from re-establishing a connection
//! - **Typed event dispatch** - inbound `{type, data}` envelopes are routed
//!   through a closed event-kind enum, with a catch-all subscription for
//!   observers that want every message
//! - **Fan-out lifecycle observation** - coarse connected/disconnected
//!   notifications that survive session replacement
//! - **Fire-and-forget send** with a boolean outcome, never a thrown error
//!
//! ## Example
//!
//! ```ignore
//! use ws_reconnect_client::{ClientConfig, EventKind, WsClient};
//!
//! let client = WsClient::for_origin("http://localhost:8000", ClientConfig::default())?;
//!
//! let _unsubscribe = client.on_connection_change(|connected| {
//!     println!("connected: {connected}");
//! });
//!
//! client.connect().await;
//! client.on(EventKind::ProgressUpdate, |data| {
//!     println!("progress: {data}");
//! });
//! ```

mod client;
mod config;
mod connection;
mod envelope;
mod error;
mod events;

pub use client::{endpoint_for_origin, WsClient};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use connection::{
    ConnectionManager, ConnectionState, EventPayload, ReconnectionInfo, Topic,
};
pub use envelope::{Envelope, EventKind, Outbound};
pub use error::{Error, ErrorEvent, ErrorKind};
pub use events::{EventBus, ListenerId};

/// Result type for ws-reconnect-client constructors and configuration
pub type Result<T> = std::result::Result<T, Error>;
