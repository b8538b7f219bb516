//! In-memory transport for controller tests.
//!
//! Tests drive the lifecycle by calling `emit_*` on the recorded
//! transports, then let the controller run with [`settle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use crate::backoff::Backoff;
use crate::buffer::{Buffer, QueueBuffer};
use crate::error::{Error, Result};
use crate::events::CloseEvent;
use crate::transport::{Connector, Endpoint, EventSink, Transport, TransportEvent};

/// Lets the controller drain everything queued so far.
///
/// Tests run with a paused clock, so this advances time by one millisecond
/// only after every other task is idle.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// MockConnector / MockTransport
// ============================================================================

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    created: Arc<Mutex<Vec<Arc<MockTransport>>>>,
}

impl MockConnector {
    pub(crate) fn count(&self) -> usize {
        self.created.lock().len()
    }

    /// Returns the n-th transport created (0-based).
    pub(crate) fn transport(&self, index: usize) -> Arc<MockTransport> {
        Arc::clone(&self.created.lock()[index])
    }

    pub(crate) fn latest(&self) -> Arc<MockTransport> {
        let created = self.created.lock();
        Arc::clone(created.last().expect("no transport created"))
    }
}

impl Connector for MockConnector {
    fn connect(&self, _endpoint: &Endpoint, sink: EventSink) -> Arc<dyn Transport> {
        let transport = Arc::new(MockTransport {
            sink,
            open: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            close_requests: Mutex::new(Vec::new()),
        });
        self.created.lock().push(Arc::clone(&transport));
        transport
    }
}

pub(crate) struct MockTransport {
    sink: EventSink,
    open: AtomicBool,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<Message>>,
    close_requests: Mutex<Vec<Option<CloseFrame>>>,
}

impl MockTransport {
    pub(crate) fn emit_open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.sink.emit(TransportEvent::Open);
    }

    pub(crate) fn emit_close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.sink.emit(TransportEvent::Close(CloseEvent::abnormal()));
    }

    pub(crate) fn emit_message(&self, message: Message) -> bool {
        self.sink.emit(TransportEvent::Message(message))
    }

    pub(crate) fn emit_error(&self, message: &str) {
        self.sink.emit(TransportEvent::Error(Error::connection(message)));
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    pub(crate) fn close_requests(&self) -> Vec<Option<CloseFrame>> {
        self.close_requests.lock().clone()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.sink.is_attached()
    }
}

impl Transport for MockTransport {
    fn send(&self, message: Message) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.sent.lock().push(message);
        Ok(())
    }

    fn close(&self, frame: Option<CloseFrame>) {
        self.close_requests.lock().push(frame);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Yields the given delays in order, repeating the last one.
pub(crate) struct ScriptedBackoff {
    delays: Vec<Duration>,
    index: usize,
    resets: Arc<AtomicUsize>,
}

impl ScriptedBackoff {
    pub(crate) fn new(delays_ms: &[u64]) -> (Self, Arc<AtomicUsize>) {
        let resets = Arc::new(AtomicUsize::new(0));
        let backoff = Self {
            delays: delays_ms.iter().copied().map(Duration::from_millis).collect(),
            index: 0,
            resets: Arc::clone(&resets),
        };
        (backoff, resets)
    }
}

impl Backoff for ScriptedBackoff {
    fn next(&mut self) -> Duration {
        let delay = self.delays[self.index.min(self.delays.len() - 1)];
        self.index += 1;
        delay
    }

    fn reset(&mut self) {
        self.index = 0;
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Queue buffer the test can inspect while the socket owns it.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer {
    inner: Arc<Mutex<QueueBuffer>>,
}

impl SharedBuffer {
    pub(crate) fn contents(&self) -> Vec<Message> {
        let mut items = Vec::new();
        self.inner.lock().for_each(&mut |m| items.push(m.clone()));
        items
    }
}

impl Buffer for SharedBuffer {
    fn write(&mut self, items: Vec<Message>) {
        self.inner.lock().write(items);
    }

    fn for_each(&self, f: &mut dyn FnMut(&Message)) {
        self.inner.lock().for_each(f);
    }

    fn clear(&mut self) {
        self.inner.lock().clear();
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
