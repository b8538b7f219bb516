//! Public socket handle.
//!
//! [`ReconnectingSocket`] is a cheap, cloneable handle. Every operation is
//! forwarded to the controller task and returns immediately; the controller
//! applies them in call order.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::trace;

use crate::backoff::Backoff;
use crate::buffer::Buffer;
use crate::events::{Callback, Dispatcher, EventKind, ListenerOptions};
use crate::transport::{Connector, Endpoint, Transport};

use super::builder::SocketBuilder;
use super::controller::Controller;

// ============================================================================
// Types
// ============================================================================

/// Listener registered on a [`ReconnectingSocket`].
pub type Listener = Callback<ReconnectingSocket>;

/// Operations forwarded to the controller.
#[derive(Debug)]
pub(crate) enum Command {
    /// Transmit, buffer or drop a message.
    Send(Message),
    /// Enter the user-closed state.
    Close(Option<CloseFrame>),
    /// Leave the user-closed state and reconnect.
    Open,
}

/// State shared between handles and the controller.
///
/// The controller is the only writer of the mirrored fields.
pub(crate) struct Shared {
    pub(crate) endpoint: Endpoint,
    pub(crate) dispatcher: Dispatcher<ReconnectingSocket>,
    pub(crate) transport: RwLock<Option<Arc<dyn Transport>>>,
    pub(crate) retry_count: AtomicU32,
    pub(crate) closed_by_user: AtomicBool,
}

/// Collaborators handed from the builder to the controller.
pub(crate) struct Parts {
    pub(crate) endpoint: Endpoint,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) buffer: Option<Box<dyn Buffer>>,
    pub(crate) backoff: Option<Box<dyn Backoff>>,
    pub(crate) listeners: Vec<(EventKind, Listener, Option<ListenerOptions>)>,
}

// ============================================================================
// ReconnectingSocket
// ============================================================================

/// WebSocket connection that survives network failures.
///
/// Every drop of the underlying transport is answered by a fresh transport
/// after the delay chosen by the configured [`Backoff`]. Messages sent while
/// disconnected go to the configured [`Buffer`] and are flushed on the next
/// open.
///
/// The controller task stops, closing the live transport, once every handle
/// has been dropped.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use resocket::{ExponentialBackoff, QueueBuffer, ReconnectingSocket};
///
/// # async fn example() -> resocket::Result<()> {
/// let socket = ReconnectingSocket::builder("wss://example.com/feed")
///     .backoff(ExponentialBackoff::new(Duration::from_millis(100)).with_max_exponent(6))
///     .buffer(QueueBuffer::new())
///     .on_message(|_, message| println!("received {message}"))
///     .build()?;
///
/// socket.send("hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReconnectingSocket {
    /// Channel for sending commands to the controller.
    pub(crate) command_tx: mpsc::UnboundedSender<Command>,
    /// State shared with the controller.
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingSocket")
            .field("url", &self.shared.endpoint.url().as_str())
            .field("retry_count", &self.retry_count())
            .field("closed_by_user", &self.is_closed_by_user())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ReconnectingSocket - Constructor
// ============================================================================

impl ReconnectingSocket {
    /// Returns a builder targeting `url`.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> SocketBuilder {
        SocketBuilder::new(url)
    }

    /// Registers the initial listeners, connects the first transport and
    /// spawns the controller task.
    pub(crate) fn spawn(parts: Parts) -> Self {
        let Parts {
            endpoint,
            connector,
            buffer,
            backoff,
            listeners,
        } = parts;

        let dispatcher = Dispatcher::new();
        for (kind, listener, options) in listeners {
            dispatcher.add_listener(kind, listener, options);
        }

        let shared = Arc::new(Shared {
            endpoint,
            dispatcher,
            transport: RwLock::new(None),
            retry_count: AtomicU32::new(0),
            closed_by_user: AtomicBool::new(false),
        });

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let mut controller = Controller::new(
            Arc::clone(&shared),
            connector,
            buffer,
            backoff,
            command_tx.downgrade(),
        );
        controller.connect();

        tokio::spawn(controller.run(command_rx));

        Self { command_tx, shared }
    }
}

// ============================================================================
// ReconnectingSocket - Public API
// ============================================================================

impl ReconnectingSocket {
    /// Sends a message.
    ///
    /// Transmitted immediately when connected, otherwise written to the
    /// buffer (or dropped without one). Ignored after [`close`](Self::close).
    pub fn send(&self, message: impl Into<Message>) {
        self.submit(Command::Send(message.into()));
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// Buffered messages are kept. Use [`open`](Self::open) to resume.
    pub fn close(&self) {
        self.submit(Command::Close(None));
    }

    /// Closes the connection with a close code and reason.
    pub fn close_with(&self, code: CloseCode, reason: impl Into<String>) {
        let reason: String = reason.into();
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        self.submit(Command::Close(Some(frame)));
    }

    /// Resumes a closed socket, replacing any existing transport.
    pub fn open(&self) {
        self.submit(Command::Open);
    }

    /// Registers a listener for `kind`.
    ///
    /// Listeners run on the controller task in registration order. The same
    /// listener may be registered more than once; each registration fires.
    pub fn add_event_listener(
        &self,
        kind: EventKind,
        listener: Listener,
        options: Option<ListenerOptions>,
    ) {
        self.shared.dispatcher.add_listener(kind, listener, options);
    }

    /// Unregisters a listener.
    ///
    /// Only registrations with the same listener *and* the same options are
    /// removed. Returns the number of registrations removed.
    pub fn remove_event_listener(
        &self,
        kind: EventKind,
        listener: &Listener,
        options: Option<ListenerOptions>,
    ) -> usize {
        self.shared.dispatcher.remove_listener(kind, listener, options)
    }

    /// Returns the current transport.
    ///
    /// The returned handle is replaced on every reconnect; do not hold on
    /// to it expecting it to follow the socket.
    #[must_use]
    pub fn underlying_transport(&self) -> Option<Arc<dyn Transport>> {
        self.shared.transport.read().clone()
    }

    /// Returns the reconnect attempts since the last successful open.
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.shared.retry_count.load(Ordering::Acquire)
    }

    /// Returns `true` once [`close`](Self::close) has been processed, until
    /// the next [`open`](Self::open).
    #[inline]
    #[must_use]
    pub fn is_closed_by_user(&self) -> bool {
        self.shared.closed_by_user.load(Ordering::Acquire)
    }

    /// Returns `true` if the current transport is ready to send.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared
            .transport
            .read()
            .as_ref()
            .is_some_and(|transport| transport.is_open())
    }

    /// Returns the endpoint this socket connects to.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    fn submit(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            trace!("Controller stopped, command ignored");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
