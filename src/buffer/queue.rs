//! Unbounded FIFO buffer.

use std::collections::VecDeque;

use tokio_tungstenite::tungstenite::Message;

use super::Buffer;

/// Keeps every message until flushed.
#[derive(Debug, Clone, Default)]
pub struct QueueBuffer {
    items: VecDeque<Message>,
}

impl QueueBuffer {
    /// Creates an empty buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Buffer for QueueBuffer {
    fn write(&mut self, items: Vec<Message>) {
        self.items.extend(items);
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
