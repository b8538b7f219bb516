//! Resocket - WebSocket client that reconnects on its own.
//!
//! [`ReconnectingSocket`] wraps a WebSocket connection and replaces it
//! whenever it drops, waiting between attempts according to a pluggable
//! [`Backoff`]. Messages sent while disconnected are kept in a pluggable
//! [`Buffer`] and flushed, oldest first, as soon as the next connection
//! opens.
//!
//! # Architecture
//!
//! - **Handle**: [`ReconnectingSocket`] is cloneable and every call returns
//!   immediately
//! - **Controller**: one tokio task per socket owns the lifecycle state and
//!   applies commands, transport events and reconnect timers one at a time
//! - **Transport**: produced by a [`Connector`]; [`WsConnector`] is the
//!   tokio-tungstenite implementation used by default
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use resocket::{ExponentialBackoff, QueueBuffer, ReconnectingSocket, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let socket = ReconnectingSocket::builder("wss://echo.example.com")
//!         .backoff(ExponentialBackoff::new(Duration::from_millis(100)).with_max_exponent(6))
//!         .buffer(QueueBuffer::new())
//!         .on_message(|_, message| println!("received: {message}"))
//!         .on_retry(|_, retry| println!("retry #{} in {:?}", retry.retry_count, retry.delay))
//!         .build()?;
//!
//!     // Buffered until the first open, then flushed
//!     socket.send("hello");
//!
//!     tokio::signal::ctrl_c().await?;
//!     socket.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`socket`] | [`ReconnectingSocket`], [`SocketBuilder`], [`SocketConfig`] |
//! | [`events`] | Event types and the listener [`Dispatcher`] |
//! | [`backoff`] | Reconnect delay strategies |
//! | [`buffer`] | Outbound message buffers |
//! | [`transport`] | Transport contract and the tokio-tungstenite transport |
//! | [`error`] | Error types and [`Result`] alias |

// ============================================================================
// Modules
// ============================================================================

/// Reconnect delay strategies.
pub mod backoff;

/// Outbound message buffers.
pub mod buffer;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Socket events and listener dispatch.
pub mod events;

/// Reconnecting socket handle, builder and lifecycle controller.
pub mod socket;

/// Transport contract and WebSocket implementation.
///
/// Implement [`Connector`] and [`Transport`] to run the socket over
/// something other than tokio-tungstenite.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Socket types
pub use socket::{Listener, ReconnectingSocket, SocketBuilder, SocketConfig};

// Event types
pub use events::{
    CloseEvent, Dispatcher, Event, EventKind, ListenerOptions, RetryEvent, listener,
};

// Strategy types
pub use backoff::{Backoff, BackoffConfig, ConstantBackoff, ExponentialBackoff, LinearBackoff};
pub use buffer::{Buffer, BufferConfig, QueueBuffer, RingBuffer};

// Transport types
pub use transport::{
    Connector, Endpoint, EventSink, Transport, TransportEvent, WsConnector, WsTransport,
};

// Error types
pub use error::{Error, Result};

// Wire types
pub use tokio_tungstenite::tungstenite::Message;
pub use tokio_tungstenite::tungstenite::protocol::CloseFrame;
pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
