//! WebSocket client transport over `tokio-tungstenite`.
//!
//! Each socket runs one background task that owns the stream:
//!
//! - Connects with [`tokio_tungstenite::connect_async`]
//! - Forwards text/binary frames as [`SocketEvent::Message`]
//! - Writes payloads queued by [`Socket::send`]
//! - Sends a close frame on [`Socket::close`]
//!
//! Plain `ws://` only; `wss://` targets fail at handshake time because no
//! TLS backend is enabled, which surfaces as `error` then `close` events.

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::event::{CloseInfo, Payload, SocketEvent};

use super::{EventSender, Socket, SocketParts, TransportFactory};

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the socket task.
enum SocketCommand {
    /// Write a payload.
    Send(Payload),
    /// Close the socket.
    Close,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport factory producing real WebSocket client sockets.
///
/// # Example
///
/// ```no_run
/// use websocket_registry::{SocketRegistry, WebSocketTransport};
///
/// # async fn example() -> websocket_registry::Result<()> {
/// let registry = SocketRegistry::new(WebSocketTransport::new());
/// let socket = registry.socket_for("ws://127.0.0.1:9001")?;
/// socket.opened().await?;
/// socket.send_text("hello")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TransportFactory for WebSocketTransport {
    fn create_socket(&self, url: &str) -> Result<SocketParts> {
        let target = super::validate_ws_url(url).map_err(|e| super::creation_error(url, e))?;
        let runtime = super::runtime_handle(url)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        runtime.spawn(run_socket(target.to_string(), command_rx, event_tx));

        debug!(url, "WebSocket socket task spawned");

        Ok(SocketParts {
            socket: Box::new(WebSocketSocket { command_tx }),
            events: event_rx,
        })
    }
}

// ============================================================================
// WebSocketSocket
// ============================================================================

/// Handle to a socket task.
struct WebSocketSocket {
    /// Channel for sending commands to the socket task.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl Socket for WebSocketSocket {
    fn send(&self, payload: Payload) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Send(payload))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.command_tx.send(SocketCommand::Close);
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// Connects, then pumps frames and commands until the socket closes.
async fn run_socket(
    url: String,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    events: EventSender,
) {
    let connect = connect_async(url.as_str());
    tokio::pin!(connect);

    let ws_stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    let err = Error::from(e);
                    warn!(url = %url, error = %err, "WebSocket connect failed");
                    let _ = events.send(SocketEvent::Error(err.to_string()));
                    let _ = events.send(SocketEvent::Close(CloseInfo::abnormal(err.to_string())));
                    return;
                }
            },

            command = command_rx.recv() => match command {
                Some(SocketCommand::Send(_)) => {
                    warn!(url = %url, "Dropping payload queued before open");
                }
                Some(SocketCommand::Close) | None => {
                    debug!(url = %url, "Socket closed before handshake completed");
                    let _ = events.send(SocketEvent::Close(CloseInfo::normal()));
                    return;
                }
            },
        }
    };

    info!(url = %url, "WebSocket connection established");
    let _ = events.send(SocketEvent::Open);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    let close = loop {
        tokio::select! {
            // Incoming frames from the peer
            message = ws_read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    trace!(url = %url, len = text.len(), "Text frame received");
                    let _ = events.send(SocketEvent::Message(Payload::Text(text.as_str().to_owned())));
                }

                Some(Ok(Message::Binary(data))) => {
                    trace!(url = %url, len = data.len(), "Binary frame received");
                    let _ = events.send(SocketEvent::Message(Payload::Binary(data.to_vec())));
                }

                Some(Ok(Message::Close(frame))) => {
                    debug!(url = %url, ?frame, "WebSocket closed by remote");
                    break frame
                        .map(|f| CloseInfo::new(u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_else(CloseInfo::no_status);
                }

                Some(Err(e)) => {
                    error!(url = %url, error = %e, "WebSocket error");
                    let _ = events.send(SocketEvent::Error(e.to_string()));
                    break CloseInfo::abnormal(e.to_string());
                }

                None => {
                    debug!(url = %url, "WebSocket stream ended");
                    break CloseInfo::abnormal("stream ended");
                }

                // Ignore Ping, Pong, raw frames
                Some(Ok(_)) => {}
            },

            // Commands from the connection
            command = command_rx.recv() => match command {
                Some(SocketCommand::Send(payload)) => {
                    let message = match payload {
                        Payload::Text(text) => Message::Text(text.into()),
                        Payload::Binary(data) => Message::Binary(data.into()),
                    };
                    if let Err(e) = ws_write.send(message).await {
                        warn!(url = %url, error = %e, "Failed to send frame");
                        let _ = events.send(SocketEvent::Error(e.to_string()));
                    }
                }

                Some(SocketCommand::Close) | None => {
                    debug!(url = %url, "Close requested");
                    let _ = ws_write.close().await;
                    break CloseInfo::normal();
                }
            },
        }
    };

    let _ = events.send(SocketEvent::Close(close));
    debug!(url = %url, "Socket task terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;
    use tokio::time::{Duration, timeout};

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_event(parts: &mut SocketParts) -> SocketEvent {
        timeout(WAIT, parts.events.recv())
            .await
            .expect("event in time")
            .expect("event stream open")
    }

    /// Accepts one client and echoes every data frame back.
    async fn spawn_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("upgrade");
            while let Some(Ok(message)) = ws.next().await {
                if message.is_text() || message.is_binary() {
                    let _ = ws.send(message).await;
                } else if message.is_close() {
                    break;
                }
            }
        });

        format!("ws://127.0.0.1:{port}")
    }

    #[test]
    fn test_create_requires_runtime() {
        let result = WebSocketTransport::new().create_socket("ws://127.0.0.1:1");
        assert!(matches!(result, Err(Error::ConnectionCreation { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_non_ws_url() {
        let result = WebSocketTransport::new().create_socket("http://example.com");
        assert!(matches!(result, Err(Error::ConnectionCreation { .. })));
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let url = spawn_echo_server().await;
        let mut parts = WebSocketTransport::new()
            .create_socket(&url)
            .expect("socket");

        assert_eq!(next_event(&mut parts).await, SocketEvent::Open);

        parts.socket.send(Payload::from("ping")).expect("send");
        assert_eq!(
            next_event(&mut parts).await,
            SocketEvent::Message(Payload::from("ping"))
        );

        parts.socket.close();
        assert!(matches!(next_event(&mut parts).await, SocketEvent::Close(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr").port()
        };

        let mut parts = WebSocketTransport::new()
            .create_socket(&format!("ws://127.0.0.1:{port}"))
            .expect("socket");

        assert!(matches!(next_event(&mut parts).await, SocketEvent::Error(_)));
        match next_event(&mut parts).await {
            SocketEvent::Close(info) => assert!(!info.was_clean),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_before_open_reports_close() {
        let url = spawn_echo_server().await;
        let mut parts = WebSocketTransport::new()
            .create_socket(&url)
            .expect("socket");

        parts.socket.close();

        // The handshake may win the race; either way a close must follow.
        let mut saw_close = false;
        for _ in 0..2 {
            if let SocketEvent::Close(_) = next_event(&mut parts).await {
                saw_close = true;
                break;
            }
        }
        assert!(saw_close);
    }
}
