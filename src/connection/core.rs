//! Connection handle and event loop.
//!
//! A [`Connection`] wraps one transport socket and re-emits its lifecycle and
//! data events to subscribers.
//!
//! # Event Loop
//!
//! Construction spawns a Tokio task that consumes the socket's event stream:
//!
//! - Drives state transitions (`open` → `Open`, `close` → `Closed`)
//! - Emits each event under the kind of the same name
//! - Resolves `opened()` / `closed()` waiters
//! - Tears down the emitter once the socket is closed
//!
//! The task keeps the connection alive until the socket reports closed, so
//! subscribers see `close` even after every handle is gone. Dropping the last
//! handle requests a close.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::emitter::{EventEmitter, Handler};
use crate::error::{Error, Result};
use crate::event::{CloseInfo, EventKind, Payload, SocketEvent};
use crate::identifiers::{ConnectionId, ListenerId};
use crate::key::ConnectionKey;
use crate::transport::{EventReceiver, Socket, SocketParts};

use super::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// Handler type for connection events.
pub type EventHandler = Handler<SocketEvent>;

/// Called once the transport reports the socket closed.
pub(crate) type CloseHook = Box<dyn Fn(ConnectionId, &ConnectionKey) + Send + Sync>;

/// Shared state behind every handle of one connection.
struct ConnectionInner {
    /// Unique id of this instance.
    id: ConnectionId,
    /// Registry key.
    key: ConnectionKey,
    /// Target as originally requested.
    url: String,
    /// Exclusively owned socket.
    socket: Box<dyn Socket>,
    /// Exclusively owned emitter.
    emitter: EventEmitter<EventKind, SocketEvent>,
    /// Lifecycle state.
    state: Mutex<ConnectionState>,
    /// Pending `opened()` callers.
    open_waiters: Mutex<Vec<oneshot::Sender<Result<()>>>>,
    /// Pending `closed()` callers.
    close_waiters: Mutex<Vec<oneshot::Sender<()>>>,
    /// Upper bound for `opened()`.
    open_timeout: Duration,
    /// Registry cleanup.
    on_close: Option<CloseHook>,
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to one registry-managed WebSocket connection.
///
/// Cloning is cheap and yields another handle to the same connection.
/// Equality is identity: two handles are equal only if they refer to the
/// same instance.
///
/// # Example
///
/// ```
/// use websocket_registry::{EventKind, MockNetwork, SocketEvent, SocketRegistry};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> websocket_registry::Result<()> {
/// let network = MockNetwork::new();
/// let _server = network.bind("ws://example.com:7000")?;
/// let registry = SocketRegistry::new(network.clone());
///
/// let socket = registry.socket_for("ws://example.com:7000")?;
/// socket.on_fn(EventKind::Message, |event: &SocketEvent| {
///     println!("received {:?}", event.payload());
/// });
///
/// socket.opened().await?;
/// socket.send_text("hello")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
    /// Shared by every handle; the last one to go requests a close.
    _lease: Arc<HandleLease>,
}

/// Closes the socket once no handle can reach the connection any more.
struct HandleLease {
    inner: Weak<ConnectionInner>,
}

impl Drop for HandleLease {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.request_close("last handle dropped");
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Wraps `parts` and spawns the event loop on `runtime`.
    pub(crate) fn new(
        runtime: &Handle,
        key: ConnectionKey,
        url: &str,
        parts: SocketParts,
        open_timeout: Duration,
        on_close: Option<CloseHook>,
    ) -> Self {
        let SocketParts { socket, events } = parts;

        let inner = Arc::new(ConnectionInner {
            id: ConnectionId::next(),
            key,
            url: url.to_owned(),
            socket,
            emitter: EventEmitter::new(),
            state: Mutex::new(ConnectionState::Connecting),
            open_waiters: Mutex::new(Vec::new()),
            close_waiters: Mutex::new(Vec::new()),
            open_timeout,
            on_close,
        });

        runtime.spawn(Self::run_event_loop(Arc::clone(&inner), events));

        debug!(id = %inner.id, key = %inner.key, "Connection created");

        let lease = Arc::new(HandleLease {
            inner: Arc::downgrade(&inner),
        });
        Self {
            inner,
            _lease: lease,
        }
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the unique id of this instance.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the registry key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &ConnectionKey {
        &self.inner.key
    }

    /// Returns the target as it was requested.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` if the connection is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the number of handlers registered for `kind`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.emitter.listener_count(&kind)
    }
}

// ============================================================================
// Connection - Subscriptions
// ============================================================================

impl Connection {
    /// Subscribes `handler` to `kind` events.
    ///
    /// Registering the same handler twice yields two invocations per event.
    pub fn on(&self, kind: EventKind, handler: EventHandler) -> ListenerId {
        self.inner.emitter.on(kind, handler)
    }

    /// Subscribes a closure, returning its id and a handle usable with [`off`](Self::off).
    pub fn on_fn<F>(&self, kind: EventKind, f: F) -> (ListenerId, EventHandler)
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.on_fn(kind, f)
    }

    /// Subscribes `handler` to the next `kind` event only.
    pub fn once(&self, kind: EventKind, handler: EventHandler) -> ListenerId {
        self.inner.emitter.once(kind, handler)
    }

    /// Removes every registration of `handler` for `kind`.
    ///
    /// Unknown handlers are a no-op. Returns how many were removed.
    pub fn off(&self, kind: EventKind, handler: &EventHandler) -> usize {
        self.inner.emitter.off(&kind, handler)
    }

    /// Removes one registration by id.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.emitter.remove_listener(id)
    }
}

// ============================================================================
// Connection - Messaging
// ============================================================================

impl Connection {
    /// Sends `payload` to the peer.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the connection is not open
    /// - [`Error::ConnectionClosed`] if the socket refused the payload
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        let state = self.state();
        if !state.can_send() {
            return Err(Error::not_open(state));
        }

        let payload = payload.into();
        trace!(id = %self.inner.id, len = payload.len(), "Sending payload");
        self.inner.socket.send(payload)
    }

    /// Sends a text payload.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    #[inline]
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Payload::Text(text.into()))
    }

    /// Sends a binary payload.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    #[inline]
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Payload::Binary(data.into()))
    }

    /// Serializes `value` as JSON and sends it as text.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - see [`send`](Self::send)
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        self.send(Payload::json(value)?)
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Requests the socket to close.
    ///
    /// Moves the connection to `Closing`; the transport's close event then
    /// moves it to `Closed` and is emitted to `close` subscribers. Calling
    /// this on a closing or closed connection does nothing.
    pub fn close(&self) {
        self.inner.request_close("close requested");
    }

    /// Waits until the connection is open.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if it closes (or was asked to) first
    /// - [`Error::ConnectionTimeout`] if it does not open within the
    ///   configured open timeout
    pub async fn opened(&self) -> Result<()> {
        let rx = {
            let state = self.inner.state.lock();
            match *state {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Closing | ConnectionState::Closed => {
                    return Err(Error::ConnectionClosed);
                }
                ConnectionState::Connecting => {}
            }

            // Registered under the state lock so the open transition cannot
            // slip between the check and the push.
            let (tx, rx) = oneshot::channel();
            self.inner.open_waiters.lock().push(tx);
            rx
        };

        let open_timeout = self.inner.open_timeout;
        match timeout(open_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::connection_timeout(millis_saturating(open_timeout))),
        }
    }

    /// Waits until the connection is closed.
    pub async fn closed(&self) {
        let rx = {
            let state = self.inner.state.lock();
            if *state == ConnectionState::Closed {
                return;
            }

            let (tx, rx) = oneshot::channel();
            self.inner.close_waiters.lock().push(tx);
            rx
        };

        let _ = rx.await;
    }
}

// ============================================================================
// Connection - Event Loop
// ============================================================================

impl Connection {
    /// Consumes transport events until the socket closes.
    async fn run_event_loop(inner: Arc<ConnectionInner>, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            if inner.handle_event(event) {
                debug!(id = %inner.id, "Event loop terminated");
                return;
            }
        }

        // Transport went away without reporting a close.
        warn!(id = %inner.id, key = %inner.key, "Event stream ended without close");
        inner.handle_event(SocketEvent::Close(CloseInfo::abnormal("event stream ended")));
    }
}

impl ConnectionInner {
    /// Moves to `Closing` and asks the socket to close. No-op once closing.
    fn request_close(&self, cause: &'static str) {
        {
            let mut state = self.state.lock();
            if state.is_closing_or_closed() {
                return;
            }
            *state = ConnectionState::Closing;
        }

        debug!(id = %self.id, key = %self.key, cause, "Closing connection");
        self.socket.close();
    }

    /// Applies one transport event. Returns `true` once the socket is closed.
    fn handle_event(&self, event: SocketEvent) -> bool {
        match &event {
            SocketEvent::Open => {
                {
                    let mut state = self.state.lock();
                    if *state != ConnectionState::Connecting {
                        debug!(id = %self.id, state = %*state, "Ignoring open outside Connecting");
                        return false;
                    }
                    *state = ConnectionState::Open;
                }

                info!(id = %self.id, key = %self.key, "Connection open");

                for waiter in self.open_waiters.lock().drain(..) {
                    let _ = waiter.send(Ok(()));
                }

                self.emitter.emit(&EventKind::Open, &event);
                false
            }

            SocketEvent::Message(payload) => {
                trace!(id = %self.id, len = payload.len(), "Message received");
                self.emitter.emit(&EventKind::Message, &event);
                false
            }

            SocketEvent::Error(message) => {
                warn!(id = %self.id, key = %self.key, error = %message, "Transport error");
                self.emitter.emit(&EventKind::Error, &event);
                false
            }

            SocketEvent::Close(close) => {
                let previous = std::mem::replace(&mut *self.state.lock(), ConnectionState::Closed);
                if previous == ConnectionState::Closed {
                    return true;
                }

                info!(
                    id = %self.id,
                    key = %self.key,
                    code = ?close.code,
                    reason = %close.reason,
                    "Connection closed"
                );

                // Leave the registry before subscribers run, so a close
                // handler asking for the same target gets a fresh connection.
                if let Some(hook) = &self.on_close {
                    hook(self.id, &self.key);
                }

                for waiter in self.open_waiters.lock().drain(..) {
                    let _ = waiter.send(Err(Error::ConnectionClosed));
                }

                self.emitter.emit(&EventKind::Close, &event);

                for waiter in self.close_waiters.lock().drain(..) {
                    let _ = waiter.send(());
                }

                self.emitter.clear();
                true
            }
        }
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
fn millis_saturating(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // Only reachable without a Closed state if the event loop never ran
        // to completion (runtime shut down).
        if !self.state.get_mut().is_closing_or_closed() {
            debug!(id = %self.id, key = %self.key, "Connection dropped while active, closing socket");
            self.socket.close();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use crate::transport::EventSender;

    /// Socket that records calls and lets the test drive events.
    struct ScriptedSocket {
        sent: Arc<Mutex<Vec<Payload>>>,
        closes: Arc<AtomicUsize>,
    }

    impl Socket for ScriptedSocket {
        fn send(&self, payload: Payload) -> Result<()> {
            self.sent.lock().push(payload);
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        connection: Connection,
        events: EventSender,
        sent: Arc<Mutex<Vec<Payload>>>,
        closes: Arc<AtomicUsize>,
    }

    fn harness(open_timeout: Duration) -> Harness {
        let (events, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        let socket = ScriptedSocket {
            sent: Arc::clone(&sent),
            closes: Arc::clone(&closes),
        };

        let connection = Connection::new(
            &Handle::current(),
            ConnectionKey::new("ws://example.com:7000"),
            "ws://example.com:7000",
            SocketParts {
                socket: Box::new(socket),
                events: rx,
            },
            open_timeout,
            None,
        );

        Harness {
            connection,
            events,
            sent,
            closes,
        }
    }

    fn kinds_log(connection: &Connection) -> Arc<Mutex<Vec<EventKind>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let log = Arc::clone(&log);
            connection.on_fn(kind, move |event: &SocketEvent| log.lock().push(event.kind()));
        }
        log
    }

    #[tokio::test]
    async fn test_starts_connecting() {
        let h = harness(Duration::from_secs(1));
        assert_eq!(h.connection.state(), ConnectionState::Connecting);
        assert_eq!(h.connection.url(), "ws://example.com:7000");
        assert_eq!(h.connection.key().as_str(), "ws://example.com:7000");
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let h = harness(Duration::from_secs(1));

        let err = h.connection.send_text("early").unwrap_err();
        assert!(matches!(
            err,
            Error::NotOpen {
                state: ConnectionState::Connecting
            }
        ));
        assert!(h.sent.lock().is_empty());
        assert_eq!(h.connection.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_open_then_send() {
        let h = harness(Duration::from_secs(1));
        h.events.send(SocketEvent::Open).expect("event");

        h.connection.opened().await.expect("open");
        assert!(h.connection.is_open());

        h.connection.send_text("hi").expect("send");
        h.connection.send_binary(vec![1u8, 2]).expect("send");
        h.connection
            .send_json(&serde_json::json!({"n": 1}))
            .expect("send");

        assert_eq!(
            *h.sent.lock(),
            vec![
                Payload::from("hi"),
                Payload::Binary(vec![1, 2]),
                Payload::from("{\"n\":1}"),
            ]
        );
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let h = harness(Duration::from_secs(1));
        let log = kinds_log(&h.connection);

        h.events.send(SocketEvent::Open).expect("event");
        h.events.send(SocketEvent::Message("m".into())).expect("event");
        h.events.send(SocketEvent::Error("e".into())).expect("event");
        h.events
            .send(SocketEvent::Close(CloseInfo::normal()))
            .expect("event");

        h.connection.closed().await;

        assert_eq!(
            *log.lock(),
            vec![
                EventKind::Open,
                EventKind::Message,
                EventKind::Error,
                EventKind::Close
            ]
        );
    }

    #[tokio::test]
    async fn test_error_does_not_change_state() {
        let h = harness(Duration::from_secs(1));
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        h.connection.on_fn(EventKind::Error, move |_: &SocketEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        h.events.send(SocketEvent::Open).expect("event");
        h.events.send(SocketEvent::Error("boom".into())).expect("event");
        h.connection.opened().await.expect("open");
        tokio::task::yield_now().await;

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(h.connection.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_close_goes_through_closing() {
        let h = harness(Duration::from_secs(1));
        h.events.send(SocketEvent::Open).expect("event");
        h.connection.opened().await.expect("open");

        h.connection.close();
        h.connection.close();

        assert_eq!(h.connection.state(), ConnectionState::Closing);
        assert_eq!(h.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            h.connection.send_text("late"),
            Err(Error::NotOpen {
                state: ConnectionState::Closing
            })
        ));

        h.events
            .send(SocketEvent::Close(CloseInfo::normal()))
            .expect("event");
        h.connection.closed().await;

        assert_eq!(h.connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_clears_listeners() {
        let h = harness(Duration::from_secs(1));
        h.connection.on_fn(EventKind::Message, |_: &SocketEvent| {});
        assert_eq!(h.connection.listener_count(EventKind::Message), 1);

        h.events
            .send(SocketEvent::Close(CloseInfo::normal()))
            .expect("event");
        h.connection.closed().await;

        assert_eq!(h.connection.listener_count(EventKind::Message), 0);
    }

    #[tokio::test]
    async fn test_pending_open_waiter_fails_on_close() {
        let h = harness(Duration::from_secs(5));
        let waiter = {
            let connection = h.connection.clone();
            tokio::spawn(async move { connection.opened().await })
        };
        tokio::task::yield_now().await;

        h.connection.close();
        h.events
            .send(SocketEvent::Close(CloseInfo::normal()))
            .expect("event");

        let result = waiter.await.expect("join");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_opened_after_close_request_fails_fast() {
        let h = harness(Duration::from_secs(5));
        h.connection.close();
        assert!(matches!(
            h.connection.opened().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_opened_times_out() {
        let h = harness(Duration::from_millis(250));
        let err = h.connection.opened().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 250 }));
    }

    #[test]
    fn test_timeout_millis_saturate() {
        assert_eq!(millis_saturating(Duration::from_millis(1500)), 1500);
        assert_eq!(millis_saturating(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_open_after_close_request_is_ignored() {
        let h = harness(Duration::from_secs(1));
        let log = kinds_log(&h.connection);

        h.connection.close();
        h.events.send(SocketEvent::Open).expect("event");
        h.events
            .send(SocketEvent::Close(CloseInfo::normal()))
            .expect("event");
        h.connection.closed().await;

        assert_eq!(*log.lock(), vec![EventKind::Close]);
    }

    #[tokio::test]
    async fn test_stream_end_is_treated_as_close() {
        let h = harness(Duration::from_secs(1));
        let Harness {
            connection, events, ..
        } = h;

        drop(events);
        connection.closed().await;

        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_identity_equality() {
        let a = harness(Duration::from_secs(1));
        let b = harness(Duration::from_secs(1));

        assert_eq!(a.connection, a.connection.clone());
        assert_ne!(a.connection, b.connection);
        assert_ne!(a.connection.id(), b.connection.id());
    }

    #[tokio::test]
    async fn test_close_is_emitted_after_last_handle_dropped() {
        let h = harness(Duration::from_secs(1));
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        h.connection.on_fn(EventKind::Close, move |event: &SocketEvent| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event.clone());
            }
        });
        h.events.send(SocketEvent::Open).expect("event");
        h.connection.opened().await.expect("open");

        let Harness {
            connection,
            events,
            closes,
            ..
        } = h;
        drop(connection);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        events
            .send(SocketEvent::Close(CloseInfo::normal()))
            .expect("event loop still running");
        let event = timeout(Duration::from_secs(1), rx)
            .await
            .expect("close in time")
            .expect("close emitted");

        assert_eq!(event, SocketEvent::Close(CloseInfo::normal()));
    }

    #[tokio::test]
    async fn test_clone_keeps_connection_open() {
        let h = harness(Duration::from_secs(1));
        let extra = h.connection.clone();

        drop(extra);

        assert_eq!(h.closes.load(Ordering::SeqCst), 0);
        assert_eq!(h.connection.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_dropping_last_handle_closes_socket() {
        let h = harness(Duration::from_secs(1));
        let closes = Arc::clone(&h.closes);

        drop(h);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
