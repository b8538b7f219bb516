//! tokio-tungstenite transport and event loop.
//!
//! Each [`WsTransport`] spawns one tokio task that connects, then handles:
//!
//! - Incoming frames (text/binary surfaced as `message` events)
//! - Outgoing messages queued by [`Transport::send`]
//! - Close requests, completing the closing handshake when possible
//!
//! A failed connect reports `error` followed by `close`, the same order a
//! browser WebSocket uses, so the socket treats it like any other drop.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::events::CloseEvent;

use super::{Connector, Endpoint, EventSink, Transport, TransportEvent};

// ============================================================================
// Constants
// ============================================================================

/// How long to wait for the peer to answer our close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Internal commands for the event loop.
enum TransportCommand {
    /// Write a message.
    Send(Message),
    /// Start the closing handshake.
    Close(Option<CloseFrame>),
}

// ============================================================================
// WsConnector
// ============================================================================

/// Creates [`WsTransport`]s. The default connector of every socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a connector.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn connect(&self, endpoint: &Endpoint, sink: EventSink) -> Arc<dyn Transport> {
        Arc::new(WsTransport::spawn(endpoint.clone(), sink))
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// One WebSocket connection attempt.
///
/// Dropping the last reference closes the connection.
pub struct WsTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Ready state, shared with the event loop.
    open: Arc<AtomicBool>,
}

impl WsTransport {
    /// Spawns the connect + event loop task.
    fn spawn(endpoint: Endpoint, sink: EventSink) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::run(endpoint, sink, command_rx, Arc::clone(&open)));

        Self { command_tx, open }
    }

    /// Connects, then runs the event loop until the connection ends.
    async fn run(
        endpoint: Endpoint,
        sink: EventSink,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        open: Arc<AtomicBool>,
    ) {
        let generation = sink.generation();

        let Some(ws_stream) = Self::establish(&endpoint, &sink, &mut command_rx).await else {
            sink.emit(TransportEvent::Close(CloseEvent::abnormal()));
            return;
        };

        info!(generation, url = %endpoint.url(), "WebSocket connection established");
        open.store(true, Ordering::Release);
        sink.emit(TransportEvent::Open);

        let close_event = Self::run_event_loop(ws_stream, &sink, &mut command_rx).await;

        open.store(false, Ordering::Release);
        debug!(
            generation,
            code = %close_event.code,
            clean = close_event.was_clean,
            "Transport terminated"
        );
        sink.emit(TransportEvent::Close(close_event));
    }

    /// Performs the opening handshake.
    ///
    /// Returns `None` if it failed or was abandoned by a close request.
    async fn establish(
        endpoint: &Endpoint,
        sink: &EventSink,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    ) -> Option<WsStream> {
        let request = match build_request(endpoint) {
            Ok(request) => request,
            Err(e) => {
                sink.emit(TransportEvent::Error(e));
                return None;
            }
        };

        let connect = connect_async(request);
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok((ws_stream, _response)) => Some(ws_stream),
                        Err(e) => {
                            warn!(url = %endpoint.url(), error = %e, "WebSocket connect failed");
                            sink.emit(TransportEvent::Error(e.into()));
                            None
                        }
                    };
                }

                command = command_rx.recv() => match command {
                    Some(TransportCommand::Send(_)) => {
                        trace!("Dropping message sent before open");
                    }
                    Some(TransportCommand::Close(_)) | None => {
                        debug!(generation = sink.generation(), "Connect abandoned");
                        return None;
                    }
                }
            }
        }
    }

    /// Event loop that handles WebSocket I/O. Returns the close payload.
    async fn run_event_loop(
        ws_stream: WsStream,
        sink: &EventSink,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    ) -> CloseEvent {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Close(frame))) => {
                            debug!("WebSocket closed by remote");
                            let _ = ws_write.close().await;
                            return CloseEvent::from_frame(frame);
                        }

                        Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                            trace!(len = message.len(), "Message received");
                            sink.emit(TransportEvent::Message(message));
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            sink.emit(TransportEvent::Error(e.into()));
                            return CloseEvent::abnormal();
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            return CloseEvent::abnormal();
                        }

                        // Ping/Pong answered by tungstenite, raw frames unused
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from the socket
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(message)) => {
                            if let Err(e) = ws_write.send(message).await {
                                warn!(error = %e, "Failed to send message");
                                sink.emit(TransportEvent::Error(e.into()));
                                return CloseEvent::abnormal();
                            }
                            trace!("Message sent");
                        }

                        Some(TransportCommand::Close(frame)) => {
                            debug!("Close requested");
                            return Self::close_handshake(&mut ws_write, &mut ws_read, frame).await;
                        }

                        None => {
                            debug!("Transport handle dropped");
                            return Self::close_handshake(&mut ws_write, &mut ws_read, None).await;
                        }
                    }
                }
            }
        }
    }

    /// Sends our close frame and waits for the peer's answer.
    async fn close_handshake(
        ws_write: &mut WsWrite,
        ws_read: &mut WsRead,
        frame: Option<CloseFrame>,
    ) -> CloseEvent {
        if let Err(e) = ws_write.send(Message::Close(frame)).await {
            debug!(error = %e, "Failed to send close frame");
            return CloseEvent::abnormal();
        }

        let answer = timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
            while let Some(message) = ws_read.next().await {
                match message {
                    Ok(Message::Close(frame)) => return Some(CloseEvent::from_frame(frame)),
                    Ok(_) => {}
                    Err(_) => return None,
                }
            }
            None
        })
        .await;

        match answer {
            Ok(Some(event)) => event,
            Ok(None) => CloseEvent::abnormal(),
            Err(_) => {
                warn!(
                    timeout_ms = CLOSE_HANDSHAKE_TIMEOUT.as_millis() as u64,
                    "Peer did not answer close frame"
                );
                CloseEvent::abnormal()
            }
        }
    }
}

impl Transport for WsTransport {
    fn send(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }

        self.command_tx
            .send(TransportCommand::Send(message))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self, frame: Option<CloseFrame>) {
        let _ = self.command_tx.send(TransportCommand::Close(frame));
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds the upgrade request, advertising the sub-protocols.
fn build_request(endpoint: &Endpoint) -> Result<Request> {
    let mut request = endpoint.url().as_str().into_client_request()?;

    if !endpoint.protocols().is_empty() {
        let value = HeaderValue::from_str(&endpoint.protocols().join(", "))
            .map_err(|e| Error::config(format!("Invalid sub-protocol header: {e}")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(request)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_tungstenite::tungstenite::error::{Error as WsError, UrlError};

    use crate::transport::Envelope;

    fn sink() -> (EventSink, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink::new(1, tx), rx)
    }

    #[test]
    fn test_constants() {
        assert_eq!(CLOSE_HANDSHAKE_TIMEOUT.as_secs(), 5);
    }

    #[test]
    fn test_build_request_sets_protocols() {
        let endpoint = Endpoint::new("ws://127.0.0.1:9/", ["graphql-ws", "v2"]).expect("valid");
        let request = build_request(&endpoint).expect("request");

        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).map(|v| v.to_str().ok()),
            Some(Some("graphql-ws, v2"))
        );
    }

    #[test]
    fn test_build_request_without_protocols() {
        let endpoint = Endpoint::new("ws://127.0.0.1:9/", Vec::<String>::new()).expect("valid");
        let request = build_request(&endpoint).expect("request");
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[tokio::test]
    async fn test_connect_refused_emits_error_then_close() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let url = format!("ws://127.0.0.1:{port}");
        let endpoint = Endpoint::new(&url, Vec::<String>::new()).expect("valid");
        let (sink, mut rx) = sink();
        let transport = WsConnector::new().connect(&endpoint, sink);

        let first = rx.recv().await.expect("error event");
        assert!(matches!(first.event, TransportEvent::Error(_)));

        let second = rx.recv().await.expect("close event");
        match second.event {
            TransportEvent::Close(close) => assert!(!close.was_clean),
            other => panic!("expected close, got {other:?}"),
        }

        assert!(!transport.is_open());
        assert!(transport.send(Message::text("late")).is_err());
    }

    #[tokio::test]
    async fn test_wss_reaches_tls_handshake() {
        // Accepts TCP, then hangs up before any TLS bytes
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let url = format!("wss://127.0.0.1:{port}");
        let endpoint = Endpoint::new(&url, Vec::<String>::new()).expect("valid");
        let (sink, mut rx) = sink();
        let _transport = WsConnector::new().connect(&endpoint, sink);

        let first = rx.recv().await.expect("error event");
        match first.event {
            TransportEvent::Error(err) => assert!(
                !matches!(err, Error::WebSocket(WsError::Url(UrlError::TlsFeatureNotEnabled))),
                "TLS support missing: {err}"
            ),
            other => panic!("expected error, got {other:?}"),
        }

        let second = rx.recv().await.expect("close event");
        assert!(matches!(second.event, TransportEvent::Close(_)));
    }

    #[tokio::test]
    async fn test_close_before_open_emits_close() {
        // Accepts TCP but never answers the upgrade
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let _held = tokio::spawn(async move {
            let conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(conn);
        });

        let url = format!("ws://127.0.0.1:{port}");
        let endpoint = Endpoint::new(&url, Vec::<String>::new()).expect("valid");
        let (sink, mut rx) = sink();
        let transport = WsConnector::new().connect(&endpoint, sink);
        transport.close(None);

        let envelope = rx.recv().await.expect("close event");
        assert!(matches!(envelope.event, TransportEvent::Close(_)));
        assert!(!transport.is_open());
    }
}
