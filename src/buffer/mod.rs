//! Outbound message buffers.
//!
//! Messages sent while no transport is ready are written to the socket's
//! [`Buffer`] and flushed, oldest first, right after the next successful
//! open. A socket without a buffer drops such messages.
//!
//! # Buffers
//!
//! | Type | Capacity | When full |
//! |------|----------|-----------|
//! | [`QueueBuffer`] | unbounded | never |
//! | [`RingBuffer`] | fixed | evicts the oldest message |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Submodules
// ============================================================================

mod queue;
mod ring;

pub use queue::QueueBuffer;
pub use ring::RingBuffer;

// ============================================================================
// Buffer
// ============================================================================

/// FIFO store for outbound messages.
pub trait Buffer: Send {
    /// Appends messages in the given order.
    fn write(&mut self, items: Vec<Message>);

    /// Visits buffered messages in insertion order.
    fn for_each(&self, f: &mut dyn FnMut(&Message));

    /// Removes every buffered message.
    fn clear(&mut self);

    /// Returns the number of buffered messages.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is buffered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns every buffered message, oldest first.
    fn drain(&mut self) -> Vec<Message> {
        let mut items = Vec::with_capacity(self.len());
        self.for_each(&mut |message| items.push(message.clone()));
        self.clear();
        items
    }
}

impl<B: Buffer + ?Sized> Buffer for Box<B> {
    fn write(&mut self, items: Vec<Message>) {
        (**self).write(items);
    }

    fn for_each(&self, f: &mut dyn FnMut(&Message)) {
        (**self).for_each(f);
    }

    fn clear(&mut self) {
        (**self).clear();
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn drain(&mut self) -> Vec<Message> {
        (**self).drain()
    }
}

// ============================================================================
// BufferConfig
// ============================================================================

/// Serializable buffer description, for loading from configuration files.
///
/// # Format
///
/// ```json
/// { "kind": "ring", "capacity": 64 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BufferConfig {
    /// Unbounded FIFO.
    Queue,
    /// Bounded FIFO evicting the oldest message.
    Ring {
        /// Maximum number of buffered messages.
        capacity: usize,
    },
}

impl BufferConfig {
    /// Builds the described buffer.
    #[must_use]
    pub fn build(&self) -> Box<dyn Buffer> {
        match *self {
            Self::Queue => Box::new(QueueBuffer::new()),
            Self::Ring { capacity } => Box::new(RingBuffer::new(capacity)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
