//! Bounded FIFO buffer.

use std::collections::VecDeque;

use tokio_tungstenite::tungstenite::Message;
use tracing::trace;

use super::Buffer;

/// Keeps at most `capacity` messages, evicting the oldest when full.
///
/// A capacity of zero drops everything written.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    items: VecDeque<Message>,
    capacity: usize,
}

impl RingBuffer {
    /// Creates an empty buffer holding at most `capacity` messages.
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the maximum number of buffered messages.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Buffer for RingBuffer {
    fn write(&mut self, items: Vec<Message>) {
        for item in items {
            if self.capacity == 0 {
                return;
            }

            if self.items.len() == self.capacity {
                self.items.pop_front();
                trace!(capacity = self.capacity, "Ring buffer full, evicted oldest message");
            }

            self.items.push_back(item);
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(&Message)) {
        self.items.iter().for_each(f);
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn drain(&mut self) -> Vec<Message> {
        self.items.drain(..).collect()
    }
}
