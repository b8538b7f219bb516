//! Builder pattern for socket configuration.
//!
//! Provides a fluent API for configuring and creating
//! [`ReconnectingSocket`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use resocket::{ConstantBackoff, ReconnectingSocket, RingBuffer};
//!
//! # async fn example() -> resocket::Result<()> {
//! let socket = ReconnectingSocket::builder("ws://127.0.0.1:9001")
//!     .protocol("chat")
//!     .backoff(ConstantBackoff::new(Duration::from_secs(1)))
//!     .buffer(RingBuffer::new(128))
//!     .on_open(|socket| socket.send("hello"))
//!     .on_retry(|_, retry| println!("attempt {} after {:?}", retry.retry_count, retry.delay))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::backoff::{Backoff, BackoffConfig};
use crate::buffer::{Buffer, BufferConfig};
use crate::error::{Error, Result};
use crate::events::{CloseEvent, EventKind, ListenerOptions, RetryEvent, listener};
use crate::transport::{Connector, Endpoint, WsConnector};

use super::core::{Listener, Parts, ReconnectingSocket};

// ============================================================================
// SocketConfig
// ============================================================================

/// Serializable socket configuration.
///
/// # Format
///
/// ```json
/// {
///   "url": "wss://example.com/feed",
///   "protocols": ["v2"],
///   "backoff": { "strategy": "exponential", "initial_ms": 100, "max_exponent": 6 },
///   "buffer": { "kind": "ring", "capacity": 256 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Target URL (`ws://` or `wss://`).
    pub url: String,

    /// Sub-protocols, in preference order.
    #[serde(default)]
    pub protocols: Vec<String>,

    /// Reconnect strategy; without one the socket never reconnects.
    #[serde(default)]
    pub backoff: Option<BackoffConfig>,

    /// Outbound buffer; without one unsent messages are dropped.
    #[serde(default)]
    pub buffer: Option<BufferConfig>,
}

// ============================================================================
// SocketBuilder
// ============================================================================

/// Builder for configuring a [`ReconnectingSocket`].
///
/// Use [`ReconnectingSocket::builder()`] to create a new builder.
pub struct SocketBuilder {
    /// Target URL, validated by `build`.
    url: String,
    /// Requested sub-protocols.
    protocols: Vec<String>,
    /// Outbound buffer.
    buffer: Option<Box<dyn Buffer>>,
    /// Reconnect strategy.
    backoff: Option<Box<dyn Backoff>>,
    /// Transport factory, tokio-tungstenite when unset.
    connector: Option<Arc<dyn Connector>>,
    /// Listeners registered before the first connect.
    listeners: Vec<(EventKind, Listener, Option<ListenerOptions>)>,
}

impl fmt::Debug for SocketBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketBuilder")
            .field("url", &self.url)
            .field("protocols", &self.protocols)
            .field("buffer", &self.buffer.is_some())
            .field("backoff", &self.backoff.is_some())
            .field("connector", &self.connector.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ============================================================================
// SocketBuilder - Constructors
// ============================================================================

impl SocketBuilder {
    /// Creates a builder targeting `url` with no backoff and no buffer.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
            buffer: None,
            backoff: None,
            connector: None,
            listeners: Vec::new(),
        }
    }

    /// Creates a builder from a deserialized configuration.
    #[must_use]
    pub fn from_config(config: &SocketConfig) -> Self {
        let mut builder = Self::new(config.url.clone()).protocols(config.protocols.iter().cloned());
        builder.backoff = config.backoff.as_ref().map(BackoffConfig::build);
        builder.buffer = config.buffer.as_ref().map(BufferConfig::build);
        builder
    }
}

// ============================================================================
// SocketBuilder - Configuration
// ============================================================================

impl SocketBuilder {
    /// Adds a sub-protocol.
    ///
    /// Once any sub-protocol is requested, the server must select one of
    /// them. A handshake answered without `Sec-WebSocket-Protocol` is
    /// rejected as an `error` event followed by `close`, and counts as a
    /// failed attempt.
    #[inline]
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Adds several sub-protocols. See [`protocol`](Self::protocol).
    #[inline]
    #[must_use]
    pub fn protocols(mut self, protocols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.protocols.extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Sets the outbound buffer.
    #[inline]
    #[must_use]
    pub fn buffer(mut self, buffer: impl Buffer + 'static) -> Self {
        self.buffer = Some(Box::new(buffer));
        self
    }

    /// Sets the reconnect strategy. Without one, the first drop is final.
    #[inline]
    #[must_use]
    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Box::new(backoff));
        self
    }

    /// Replaces the tokio-tungstenite transport.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Registers a listener before the first connect.
    #[inline]
    #[must_use]
    pub fn listener(
        mut self,
        kind: EventKind,
        listener: Listener,
        options: Option<ListenerOptions>,
    ) -> Self {
        self.listeners.push((kind, listener, options));
        self
    }
}

// ============================================================================
// SocketBuilder - Event Shortcuts
// ============================================================================

impl SocketBuilder {
    /// Calls `f` on every `open` event.
    #[must_use]
    pub fn on_open<F>(self, f: F) -> Self
    where
        F: Fn(&ReconnectingSocket) + Send + Sync + 'static,
    {
        self.listener(EventKind::Open, listener(move |socket, _| f(socket)), None)
    }

    /// Calls `f` on every `close` event.
    #[must_use]
    pub fn on_close<F>(self, f: F) -> Self
    where
        F: Fn(&ReconnectingSocket, &CloseEvent) + Send + Sync + 'static,
    {
        let callback: Listener = listener(move |socket, event| {
            if let Some(close) = event.as_close() {
                f(socket, close);
            }
        });
        self.listener(EventKind::Close, callback, None)
    }

    /// Calls `f` on every `error` event.
    #[must_use]
    pub fn on_error<F>(self, f: F) -> Self
    where
        F: Fn(&ReconnectingSocket, &Error) + Send + Sync + 'static,
    {
        let callback: Listener = listener(move |socket, event| {
            if let Some(err) = event.as_error() {
                f(socket, err);
            }
        });
        self.listener(EventKind::Error, callback, None)
    }

    /// Calls `f` on every `message` event.
    #[must_use]
    pub fn on_message<F>(self, f: F) -> Self
    where
        F: Fn(&ReconnectingSocket, &Message) + Send + Sync + 'static,
    {
        let callback: Listener = listener(move |socket, event| {
            if let Some(message) = event.as_message() {
                f(socket, message);
            }
        });
        self.listener(EventKind::Message, callback, None)
    }

    /// Calls `f` on every `retry` event.
    #[must_use]
    pub fn on_retry<F>(self, f: F) -> Self
    where
        F: Fn(&ReconnectingSocket, &RetryEvent) + Send + Sync + 'static,
    {
        let callback: Listener = listener(move |socket, event| {
            if let Some(retry) = event.as_retry() {
                f(socket, retry);
            }
        });
        self.listener(EventKind::Retry, callback, None)
    }
}

// ============================================================================
// SocketBuilder - Build
// ============================================================================

impl SocketBuilder {
    /// Validates the configuration, starts connecting and returns the socket.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL does not parse
    /// - [`Error::Config`] if the scheme or a sub-protocol is invalid, or
    ///   if called outside a tokio runtime
    pub fn build(self) -> Result<ReconnectingSocket> {
        if Handle::try_current().is_err() {
            return Err(Error::config(
                "ReconnectingSocket must be built inside a tokio runtime",
            ));
        }

        let endpoint = Endpoint::new(&self.url, self.protocols)?;

        debug!(
            url = %endpoint.url(),
            backoff = self.backoff.is_some(),
            buffer = self.buffer.is_some(),
            "Building socket"
        );

        Ok(ReconnectingSocket::spawn(Parts {
            endpoint,
            connector: self.connector.unwrap_or_else(|| Arc::new(WsConnector::new())),
            buffer: self.buffer,
            backoff: self.backoff,
            listeners: self.listeners,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio_test::assert_err;

    use crate::backoff::ConstantBackoff;
    use crate::socket::mock::{MockConnector, settle};

    #[tokio::test]
    async fn test_build_rejects_unparseable_url() {
        let err = assert_err!(SocketBuilder::new("not a url").build());
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_build_rejects_http_scheme() {
        let err = assert_err!(SocketBuilder::new("http://example.com").build());
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_build_rejects_duplicate_protocols() {
        let err = assert_err!(
            SocketBuilder::new("ws://example.com")
                .protocols(["chat", "chat"])
                .build()
        );
        assert!(err.is_config_error());
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = assert_err!(SocketBuilder::new("ws://example.com").build());
        assert!(err.is_config_error());
    }

    #[test]
    fn test_config_from_json() {
        let config: SocketConfig = serde_json::from_str(
            r#"{
                "url": "wss://example.com/feed",
                "protocols": ["v2"],
                "backoff": { "strategy": "constant", "delay_ms": 250 },
                "buffer": { "kind": "ring", "capacity": 8 }
            }"#,
        )
        .expect("valid config");

        assert_eq!(config.url, "wss://example.com/feed");
        assert_eq!(config.protocols, ["v2"]);
        assert_eq!(config.backoff, Some(BackoffConfig::Constant { delay_ms: 250 }));
        assert_eq!(config.buffer, Some(BufferConfig::Ring { capacity: 8 }));

        let builder = SocketBuilder::from_config(&config);
        assert!(builder.backoff.is_some());
        assert!(builder.buffer.is_some());
        assert_eq!(builder.protocols, ["v2"]);
    }

    #[test]
    fn test_config_defaults() {
        let config: SocketConfig =
            serde_json::from_str(r#"{ "url": "ws://localhost" }"#).expect("valid config");

        assert!(config.protocols.is_empty());
        assert!(config.backoff.is_none());
        assert!(config.buffer.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_shortcuts_receive_payloads() {
        let connector = MockConnector::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (on_open, on_message, on_close, on_retry) =
            (Arc::clone(&seen), Arc::clone(&seen), Arc::clone(&seen), Arc::clone(&seen));

        let _socket = SocketBuilder::new("ws://test.invalid")
            .connector(connector.clone())
            .backoff(ConstantBackoff::new(Duration::from_millis(50)))
            .on_open(move |_| on_open.lock().push("open".to_string()))
            .on_message(move |_, message| on_message.lock().push(format!("message:{message}")))
            .on_close(move |_, close| on_close.lock().push(format!("close:{}", close.code)))
            .on_retry(move |_, retry| on_retry.lock().push(format!("retry:{}", retry.retry_count)))
            .build()
            .expect("valid config");

        let transport = connector.latest();
        transport.emit_open();
        transport.emit_message(Message::text("hi"));
        transport.emit_close();
        settle().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            *seen.lock(),
            ["open", "message:hi", "close:1006", "retry:1"]
        );
    }
}
