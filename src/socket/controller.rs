//! Connection lifecycle controller.
//!
//! One tokio task per socket owns every piece of mutable lifecycle state:
//! the current transport, the user-closed flag, the retry counter, the
//! pending reconnect timer and both collaborators. Commands from handles,
//! transport events and the reconnect timer are serialized through a single
//! `tokio::select!` loop, so no state transition ever races another.
//!
//! # Event Handling
//!
//! | Native event | Bookkeeping | Re-emitted |
//! |--------------|-------------|------------|
//! | `open` | reset retries and backoff, flush buffer | after bookkeeping |
//! | `close` | schedule reconnect unless user-closed | after scheduling |
//! | `error` | none | verbatim |
//! | `message` | none | verbatim |

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Sleep, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::buffer::Buffer;
use crate::events::{Event, RetryEvent};
use crate::transport::{Connector, Envelope, EventSink, Transport, TransportEvent};

use super::core::{Command, ReconnectingSocket, Shared};

// ============================================================================
// Types
// ============================================================================

/// The live transport and the sink it reports through.
struct Current {
    generation: u64,
    sink: EventSink,
    transport: Arc<dyn Transport>,
    /// Set once this transport's `open` event has been processed.
    opened: bool,
}

/// A scheduled reconnect attempt. Dropping it cancels the attempt.
struct PendingRetry {
    delay: Duration,
    timer: Pin<Box<Sleep>>,
}

// ============================================================================
// Controller
// ============================================================================

/// Owner of the socket's lifecycle state. Runs as a single task.
pub(crate) struct Controller {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    buffer: Option<Box<dyn Buffer>>,
    backoff: Option<Box<dyn Backoff>>,
    /// Used to hand listeners a socket handle without keeping the task alive.
    handle: mpsc::WeakUnboundedSender<Command>,
    event_tx: mpsc::UnboundedSender<Envelope>,
    event_rx: mpsc::UnboundedReceiver<Envelope>,
    current: Option<Current>,
    generation: u64,
    closed_by_user: bool,
    retry_count: u32,
    pending_retry: Option<PendingRetry>,
}

impl Controller {
    pub(crate) fn new(
        shared: Arc<Shared>,
        connector: Arc<dyn Connector>,
        buffer: Option<Box<dyn Buffer>>,
        backoff: Option<Box<dyn Backoff>>,
        handle: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            shared,
            connector,
            buffer,
            backoff,
            handle,
            event_tx,
            event_rx,
            current: None,
            generation: 0,
            closed_by_user: false,
            retry_count: 0,
            pending_retry: None,
        }
    }

    /// Processes commands, transport events and reconnect timers until every
    /// socket handle is dropped.
    pub(crate) async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                Some(envelope) = self.event_rx.recv() => {
                    self.handle_transport_event(envelope);
                }

                delay = retry_elapsed(&mut self.pending_retry) => {
                    self.retry(delay);
                }
            }
        }

        if let Some(current) = self.current.take() {
            current.sink.detach();
            current.transport.close(None);
        }
        *self.shared.transport.write() = None;

        debug!("Controller terminated");
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Replaces the current transport with a fresh one.
    ///
    /// The superseded transport is detached before it is asked to close, so
    /// none of its remaining events reach listeners.
    pub(crate) fn connect(&mut self) {
        if let Some(previous) = self.current.take() {
            previous.sink.detach();
            previous.transport.close(None);
            debug!(generation = previous.generation, "Detached superseded transport");
        }

        self.generation += 1;
        let generation = self.generation;
        let sink = EventSink::new(generation, self.event_tx.clone());
        let transport = self.connector.connect(&self.shared.endpoint, sink.clone());

        *self.shared.transport.write() = Some(Arc::clone(&transport));
        self.current = Some(Current {
            generation,
            sink,
            transport,
            opened: false,
        });

        info!(generation, url = %self.shared.endpoint.url(), "Connecting");
    }

    /// Schedules the next reconnect attempt, if a backoff is configured.
    fn schedule_reconnect(&mut self) {
        let Some(backoff) = self.backoff.as_mut() else {
            warn!("Connection lost and no backoff configured, giving up");
            return;
        };

        let delay = backoff.next();
        debug!(
            delay_ms = delay.as_millis() as u64,
            retry_count = self.retry_count + 1,
            "Reconnect scheduled"
        );

        self.pending_retry = Some(PendingRetry {
            delay,
            timer: Box::pin(sleep(delay)),
        });
    }

    /// Runs a reconnect attempt whose timer elapsed.
    fn retry(&mut self, delay: Duration) {
        self.pending_retry = None;
        self.set_retry_count(self.retry_count.saturating_add(1));

        self.dispatch(Event::Retry(RetryEvent {
            retry_count: self.retry_count,
            delay,
        }));

        self.connect();
    }

    fn cancel_pending_retry(&mut self) {
        if self.pending_retry.take().is_some() {
            debug!("Pending reconnect cancelled");
        }
    }

    fn set_retry_count(&mut self, retry_count: u32) {
        self.retry_count = retry_count;
        self.shared.retry_count.store(retry_count, Ordering::Release);
    }

    fn set_closed_by_user(&mut self, closed: bool) {
        self.closed_by_user = closed;
        self.shared.closed_by_user.store(closed, Ordering::Release);
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(message) => self.send(message),
            Command::Close(frame) => self.close(frame),
            Command::Open => self.open(),
        }
    }

    /// Transmits, buffers or drops a message.
    fn send(&mut self, message: Message) {
        if self.closed_by_user {
            trace!("Socket closed by user, message dropped");
            return;
        }

        let ready = self
            .current
            .as_ref()
            .filter(|current| current.opened && current.transport.is_open())
            .map(|current| Arc::clone(&current.transport));

        let Some(transport) = ready else {
            self.buffer_message(message);
            return;
        };

        if let Err(e) = transport.send(message.clone()) {
            warn!(error = %e, "Transport send failed, buffering message");
            self.buffer_message(message);
        }
    }

    fn buffer_message(&mut self, message: Message) {
        match self.buffer.as_mut() {
            Some(buffer) => {
                buffer.write(vec![message]);
                debug!(buffered = buffer.len(), "Message buffered");
            }
            None => trace!("No buffer configured, message dropped"),
        }
    }

    fn close(&mut self, frame: Option<CloseFrame>) {
        info!("Closed by user");
        self.set_closed_by_user(true);
        self.cancel_pending_retry();

        if let Some(current) = &self.current {
            current.transport.close(frame);
        }
    }

    fn open(&mut self) {
        info!("Opened by user");
        self.set_closed_by_user(false);
        self.cancel_pending_retry();
        self.connect();
    }

    // ========================================================================
    // Transport Events
    // ========================================================================

    fn handle_transport_event(&mut self, envelope: Envelope) {
        let Envelope { generation, event } = envelope;

        let Some(current) = self.current.as_mut().filter(|c| c.generation == generation) else {
            trace!(generation, "Ignoring event from superseded transport");
            return;
        };

        match event {
            TransportEvent::Open => {
                current.opened = true;
                debug!(generation, "Transport open");

                self.set_retry_count(0);
                if let Some(backoff) = self.backoff.as_mut() {
                    backoff.reset();
                }
                self.flush_buffer();

                self.dispatch(Event::Open);
            }

            TransportEvent::Close(close) => {
                current.opened = false;
                debug!(generation, code = %close.code, clean = close.was_clean, "Transport closed");

                if self.closed_by_user {
                    debug!("Closed by user, not reconnecting");
                } else {
                    self.schedule_reconnect();
                }

                self.dispatch(Event::Close(close));
            }

            TransportEvent::Error(err) => self.dispatch(Event::Error(err)),

            TransportEvent::Message(message) => self.dispatch(Event::Message(message)),
        }
    }

    /// Sends every buffered message, oldest first.
    fn flush_buffer(&mut self) {
        let pending = match self.buffer.as_mut() {
            Some(buffer) => buffer.drain(),
            None => return,
        };

        if pending.is_empty() {
            return;
        }

        debug!(count = pending.len(), "Flushing buffered messages");

        for message in pending {
            self.send(message);
        }
    }

    /// Hands `event` to the listeners.
    fn dispatch(&self, event: Event) {
        let Some(command_tx) = self.handle.upgrade() else {
            trace!(kind = %event.kind(), "No socket handle left, event dropped");
            return;
        };

        let socket = ReconnectingSocket {
            command_tx,
            shared: Arc::clone(&self.shared),
        };

        self.shared.dispatcher.dispatch(&socket, &event);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Completes when the pending reconnect timer elapses, never if none is set.
async fn retry_elapsed(pending: &mut Option<PendingRetry>) -> Duration {
    match pending {
        Some(retry) => {
            retry.timer.as_mut().await;
            retry.delay
        }
        None => std::future::pending().await,
    }
}
