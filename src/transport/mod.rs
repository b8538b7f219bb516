//! Transport layer.
//!
//! A transport is one physical connection attempt. The socket never
//! repairs a transport: on every failure it detaches the old one and asks
//! its [`Connector`] for a fresh one.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   connect(endpoint, sink)   ┌─────────────────┐
//! │  ReconnectingSocket  │ ───────────────────────────►│   Connector     │
//! │  (controller task)   │                             └────────┬────────┘
//! │                      │◄──── EventSink (gen N) ─────┐        │ creates
//! │                      │                             │        ▼
//! │                      │ ─── send / close ──────────►│  Transport gen N │
//! └──────────────────────┘                             └──────────────────┘
//! ```
//!
//! # Transport Lifecycle
//!
//! 1. `Connector::connect` - Create a transport bound to a fresh [`EventSink`]
//! 2. Transport emits `Open` once ready, then any `Message`/`Error`
//! 3. Transport emits `Close` exactly once when it ends
//! 4. On replacement the sink is detached; later emits are discarded
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | tokio-tungstenite transport and its event loop |

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};
use crate::events::CloseEvent;

// ============================================================================
// Submodules
// ============================================================================

/// tokio-tungstenite transport.
pub mod connection;

pub use connection::{WsConnector, WsTransport};

// ============================================================================
// Endpoint
// ============================================================================

/// Target address and sub-protocol list, fixed for a socket's lifetime.
///
/// `wss` endpoints connect over native TLS. A non-empty protocol list
/// requires the server to select one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    protocols: Vec<String>,
}

impl Endpoint {
    /// Creates an endpoint after validating the URL and sub-protocols.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL does not parse
    /// - [`Error::Config`] if the scheme is not `ws`/`wss`, or a
    ///   sub-protocol is empty, not a token, or repeated
    pub fn new<I, S>(url: &str, protocols: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let url = Url::parse(url).map_err(|e| Error::invalid_url(url, e))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }

        let protocols: Vec<String> = protocols.into_iter().map(Into::into).collect();

        if let Some(invalid) = protocols.iter().find(|p| !is_token(p)) {
            return Err(Error::config(format!("Invalid sub-protocol '{invalid}'")));
        }

        let mut seen = HashSet::with_capacity(protocols.len());
        if let Some(duplicate) = protocols.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(Error::config(format!("Duplicate sub-protocol '{duplicate}'")));
        }

        Ok(Self { url, protocols })
    }

    /// Returns the target URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the requested sub-protocols, in preference order.
    #[inline]
    #[must_use]
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }
}

/// RFC 7230 token: visible ASCII without separators.
fn is_token(value: &str) -> bool {
    const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={}";

    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_graphic() && !SEPARATORS.contains(&b))
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Native lifecycle event reported by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// The transport is ready to send.
    Open,
    /// The transport ended. Emitted exactly once.
    Close(CloseEvent),
    /// The transport failed.
    Error(Error),
    /// Data arrived.
    Message(Message),
}

/// Transport event tagged with the generation of the transport that
/// produced it.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) generation: u64,
    pub(crate) event: TransportEvent,
}

// ============================================================================
// EventSink
// ============================================================================

/// Where a transport reports its lifecycle events.
///
/// Each sink belongs to exactly one transport. When the socket replaces
/// that transport it detaches the sink, after which [`EventSink::emit`]
/// discards everything.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    attached: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            generation,
            attached: Arc::new(AtomicBool::new(true)),
            tx,
        }
    }

    /// Reports an event. Returns `false` if it was discarded.
    pub fn emit(&self, event: TransportEvent) -> bool {
        if !self.is_attached() {
            trace!(
                generation = self.generation,
                ?event,
                "Discarding event from detached transport"
            );
            return false;
        }

        self.tx
            .send(Envelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Returns `true` until the socket detaches this sink.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Returns the generation of the transport this sink belongs to.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}

// ============================================================================
// Transport / Connector
// ============================================================================

/// Handle to one physical connection attempt.
///
/// Implementations report lifecycle events through the [`EventSink`] they
/// were created with.
pub trait Transport: Send + Sync {
    /// Transmits a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot carry the message; the
    /// socket then buffers it.
    fn send(&self, message: Message) -> Result<()>;

    /// Requests closure. Does not wait for the closing handshake.
    fn close(&self, frame: Option<CloseFrame>);

    /// Returns `true` while the transport is ready to send.
    fn is_open(&self) -> bool;
}

/// Factory creating a new transport for every connect attempt.
pub trait Connector: Send + Sync {
    /// Starts connecting to `endpoint`, reporting events through `sink`.
    fn connect(&self, endpoint: &Endpoint, sink: EventSink) -> Arc<dyn Transport>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_accepts_ws_and_wss() {
        let endpoint =
            Endpoint::new("ws://localhost:9000/feed", ["chat", "superchat"]).expect("valid");
        assert_eq!(endpoint.url().as_str(), "ws://localhost:9000/feed");
        assert_eq!(endpoint.protocols(), ["chat", "superchat"]);

        assert!(Endpoint::new("wss://example.com", Vec::<String>::new()).is_ok());
    }

    #[test]
    fn test_endpoint_rejects_bad_input() {
        let err = Endpoint::new("http://example.com", Vec::<String>::new()).unwrap_err();
        assert!(err.is_config_error());

        let err = Endpoint::new("::not a url::", Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));

        assert!(Endpoint::new("ws://h", ["has space"]).is_err());
        assert!(Endpoint::new("ws://h", [""]).is_err());
        assert!(Endpoint::new("ws://h", ["a,b"]).is_err());
        assert!(Endpoint::new("ws://h", ["chat", "chat"]).is_err());
    }

    #[tokio::test]
    async fn test_sink_discards_after_detach() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);

        assert!(sink.emit(TransportEvent::Open));
        let envelope = rx.recv().await.expect("event delivered");
        assert_eq!(envelope.generation, 7);
        assert!(matches!(envelope.event, TransportEvent::Open));

        sink.detach();
        assert!(!sink.is_attached());
        assert!(!sink.emit(TransportEvent::Open));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(1, tx);
        drop(rx);

        assert!(!sink.emit(TransportEvent::Open));
        assert_eq!(sink.generation(), 1);
    }
}
