//! Public event types.
//!
//! Native transport events (`open`, `close`, `error`, `message`) and the
//! synthetic `retry` event share one tagged type so a single dispatcher
//! serves all of them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::error::Error;

// ============================================================================
// EventKind
// ============================================================================

/// Discriminant of an [`Event`], used as the listener registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Transport became ready.
    Open,
    /// Transport closed, expectedly or not.
    Close,
    /// Transport reported an error.
    Error,
    /// Data received from the peer.
    Message,
    /// A reconnect attempt is about to be made.
    Retry,
}

impl EventKind {
    /// All event kinds, in declaration order.
    pub const ALL: [EventKind; 5] = [
        EventKind::Open,
        EventKind::Close,
        EventKind::Error,
        EventKind::Message,
        EventKind::Retry,
    ];

    /// Returns the lowercase event name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Error => "error",
            Self::Message => "message",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CloseEvent
// ============================================================================

/// Payload of a `close` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code sent by the peer, or `Abnormal` (1006) when none was.
    pub code: CloseCode,
    /// Close reason sent by the peer.
    pub reason: String,
    /// Whether the closing handshake completed.
    pub was_clean: bool,
}

impl CloseEvent {
    /// Builds the payload from the close frame received, if any.
    ///
    /// A missing frame means the connection dropped without a closing
    /// handshake.
    #[must_use]
    pub fn from_frame(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self {
                code: frame.code,
                reason: frame.reason.as_str().to_owned(),
                was_clean: true,
            },
            None => Self::abnormal(),
        }
    }

    /// Payload for a connection lost without a closing handshake.
    #[inline]
    #[must_use]
    pub fn abnormal() -> Self {
        Self {
            code: CloseCode::Abnormal,
            reason: String::new(),
            was_clean: false,
        }
    }
}

// ============================================================================
// RetryEvent
// ============================================================================

/// Payload of the synthetic `retry` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryEvent {
    /// Attempts made since the last successful open, including this one.
    pub retry_count: u32,
    /// Delay waited before this attempt.
    pub delay: Duration,
}

// ============================================================================
// Event
// ============================================================================

/// An event delivered to listeners.
#[derive(Debug)]
pub enum Event {
    /// Transport became ready; buffered messages were already flushed.
    Open,
    /// Transport closed.
    Close(CloseEvent),
    /// Transport error, passed through verbatim.
    Error(Error),
    /// Data received from the peer.
    Message(Message),
    /// A reconnect attempt is about to be made.
    Retry(RetryEvent),
}

impl Event {
    /// Returns the kind of this event.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close(_) => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::Message(_) => EventKind::Message,
            Self::Retry(_) => EventKind::Retry,
        }
    }

    /// Returns the message payload, if this is a `message` event.
    #[inline]
    #[must_use]
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Returns the close payload, if this is a `close` event.
    #[inline]
    #[must_use]
    pub fn as_close(&self) -> Option<&CloseEvent> {
        match self {
            Self::Close(close) => Some(close),
            _ => None,
        }
    }

    /// Returns the retry payload, if this is a `retry` event.
    #[inline]
    #[must_use]
    pub fn as_retry(&self) -> Option<&RetryEvent> {
        match self {
            Self::Retry(retry) => Some(retry),
            _ => None,
        }
    }

    /// Returns the error, if this is an `error` event.
    #[inline]
    #[must_use]
    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
