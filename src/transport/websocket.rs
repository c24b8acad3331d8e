//! WebSocket transport and event loop.
//!
//! [`WebSocketTransport::subscribe`] spawns a tokio task that owns the
//! socket. The task handles:
//!
//! - Connecting, with an optional connect timeout
//! - Sending the subscription payload as the first frame
//! - Forwarding inbound text as [`TransportEvent`]s
//! - Writing pushed frames
//! - Reconnecting after drops, up to `max_request` attempts
//!
//! Events are delivered on the [`EventReceiver`] returned by
//! [`WebSocketTransport::new`]; feed them to
//! [`Session::handle_event`](crate::Session::handle_event).
//!
//! # Reconnection
//!
//! | Exit | `reconnect` off | `reconnect` on |
//! |------|-----------------|----------------|
//! | Local close | stop | stop |
//! | Remote close / idle | `closed` | `re-opening`, retry |
//! | Connect or I/O error | `transportFailure` | `re-opening`, retry |
//!
//! A retry replays whatever payload was last set through
//! [`TransportHandle::reopen_with`].

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::wire::PROTOCOL_VERSION;

use super::{
    PROTOCOL_HEADER, PushRequest, SubscribeRequest, Transport, TransportEvent, TransportHandle,
    TransportKind,
};

// ============================================================================
// Types
// ============================================================================

/// Receiving end of transport events.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

type EventSender = mpsc::UnboundedSender<TransportEvent>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Payload replayed on every (re)connection.
#[derive(Debug)]
struct Replay {
    method: String,
    data: String,
}

/// Commands for the event loop.
enum Command {
    /// Write a frame.
    Push(String),
    /// Close the socket and stop.
    Close,
}

/// Why a connection ended.
enum Exit {
    /// Closed by us, or nobody listens to events anymore.
    Local,
    /// Closed by the server or recycled after inactivity.
    Dropped,
    /// Connect or I/O failure.
    Failed(String),
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over tokio-tungstenite.
///
/// # Example
///
/// ```ignore
/// let (transport, mut events) = WebSocketTransport::new();
/// let mut session = Session::new(transport, SessionOptions::default())?;
/// session.open(Request::new().with_path("ws://localhost:8080/ss"))?;
///
/// while let Some(event) = events.recv().await {
///     session.handle_event(event);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    base_url: Option<Url>,
    events_tx: EventSender,
}

impl WebSocketTransport {
    /// Creates a transport and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, EventReceiver) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                base_url: None,
                events_tx,
            },
            events_rx,
        )
    }

    /// Sets the URL relative subscription paths resolve against.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `base_url` does not parse.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Some(Url::parse(base_url)?);
        Ok(self)
    }

    /// Resolves a subscription path to a `ws`/`wss` URL tagged with the
    /// protocol query parameter.
    fn resolve_url(&self, path: &str) -> Result<Url> {
        let mut url = match Url::parse(path) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(path)?,
                None => {
                    return Err(Error::config(format!(
                        "relative path '{path}' needs a base URL"
                    )));
                }
            },
            Err(e) => return Err(e.into()),
        };

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(Error::config(format!("unsupported URL scheme '{other}'"))),
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|()| Error::config(format!("cannot switch {url} to {scheme}")))?;
        }

        url.query_pairs_mut()
            .append_pair(PROTOCOL_HEADER, PROTOCOL_VERSION);
        Ok(url)
    }
}

impl Transport for WebSocketTransport {
    type Handle = WebSocketHandle;

    fn subscribe(&mut self, request: SubscribeRequest) -> Result<WebSocketHandle> {
        let url = self.resolve_url(&request.path)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::connection(format!("no tokio runtime: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let replay = Arc::new(Mutex::new(Replay {
            method: request.method.clone(),
            data: request.data.clone(),
        }));
        let closed = Arc::new(AtomicBool::new(false));

        debug!(%url, transport = %request.transport, "Subscribing");

        let event_loop = EventLoop {
            url,
            request,
            replay: Arc::clone(&replay),
            events_tx: self.events_tx.clone(),
            closed: Arc::clone(&closed),
        };
        runtime.spawn(event_loop.run(command_rx));

        Ok(WebSocketHandle {
            command_tx,
            replay,
            closed,
        })
    }
}

// ============================================================================
// WebSocketHandle
// ============================================================================

/// Handle to a running WebSocket subscription.
#[derive(Debug)]
pub struct WebSocketHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    replay: Arc<Mutex<Replay>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push(data) => f.debug_tuple("Push").field(&data.len()).finish(),
            Self::Close => f.write_str("Close"),
        }
    }
}

impl TransportHandle for WebSocketHandle {
    fn push(&mut self, request: PushRequest) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.command_tx
            .send(Command::Push(request.data))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn reopen_with(&mut self, method: &str, data: String) {
        let mut replay = self.replay.lock();
        replay.method = method.to_string();
        replay.data = data;
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.command_tx.send(Command::Close);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// EventLoop
// ============================================================================

struct EventLoop {
    url: Url,
    request: SubscribeRequest,
    replay: Arc<Mutex<Replay>>,
    events_tx: EventSender,
    closed: Arc<AtomicBool>,
}

impl EventLoop {
    async fn run(self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        self.drive(&mut command_rx).await;
        self.closed.store(true, Ordering::Release);
        debug!(url = %self.url, "Event loop terminated");
    }

    async fn drive(&self, command_rx: &mut mpsc::UnboundedReceiver<Command>) {
        let mut attempts: u32 = 0;
        let mut outbox: VecDeque<String> = VecDeque::new();

        loop {
            attempts += 1;

            // Keep queuing pushes while the connection is being established.
            let connected = {
                let connect = self.connect();
                tokio::pin!(connect);
                loop {
                    tokio::select! {
                        result = &mut connect => break result,
                        command = command_rx.recv() => match command {
                            Some(Command::Push(data)) => outbox.push_back(data),
                            Some(Command::Close) | None => return,
                        }
                    }
                }
            };

            let exit = match connected {
                Ok(stream) => {
                    info!(url = %self.url, "WebSocket connected");
                    attempts = 0;
                    if self.emit(TransportEvent::opening()) {
                        self.pump(stream, command_rx, &mut outbox).await
                    } else {
                        Exit::Local
                    }
                }
                Err(e) => Exit::Failed(e.to_string()),
            };

            let reason = match exit {
                Exit::Local => return,
                Exit::Dropped if !self.request.reconnect => {
                    self.finish(TransportEvent::closed());
                    return;
                }
                Exit::Dropped => "connection dropped".to_string(),
                Exit::Failed(reason) => reason,
            };

            if !self.request.reconnect || attempts >= self.request.max_request {
                warn!(%reason, attempts, "Giving up on subscription");
                self.finish(TransportEvent::transport_failure(reason));
                return;
            }

            warn!(%reason, attempt = attempts, "Subscription lost, reconnecting");
            if !self.emit(TransportEvent::reopening()) {
                return;
            }
            sleep(self.request.reconnect_interval).await;
            tokio::task::yield_now().await;
        }
    }

    /// Emits a terminal event. The handle reports closed before the
    /// receiver can observe the event.
    fn finish(&self, event: TransportEvent) {
        self.closed.store(true, Ordering::Release);
        self.emit(event);
    }

    async fn connect(&self) -> Result<WsStream> {
        let mut request = self.url.as_str().into_client_request()?;
        for header in &self.request.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| Error::config(format!("header '{}': {e}", header.name)))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| Error::config(format!("header '{}': {e}", header.name)))?;
            request.headers_mut().insert(name, value);
        }

        let connect = connect_async(request);
        let (stream, _response) = match self.request.connect_timeout {
            Some(limit) => timeout(limit, connect).await.map_err(|_| {
                Error::connection(format!("connect timed out after {}ms", limit.as_millis()))
            })??,
            None => connect.await?,
        };
        Ok(stream)
    }

    /// Runs one connection until it ends.
    async fn pump(
        &self,
        stream: WsStream,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
        outbox: &mut VecDeque<String>,
    ) -> Exit {
        let (mut write, mut read) = stream.split();

        let (method, initial) = {
            let replay = self.replay.lock();
            (replay.method.clone(), replay.data.clone())
        };
        if !initial.is_empty() {
            debug!(%method, len = initial.len(), "Sending subscription payload");
            if let Err(e) = write.send(Message::Text(initial.into())).await {
                return Exit::Failed(e.to_string());
            }
        }

        while let Some(data) = outbox.pop_front() {
            if let Err(e) = write.send(Message::Text(data.clone().into())).await {
                outbox.push_front(data);
                return Exit::Failed(e.to_string());
            }
        }

        let idle = self.request.timeout;

        loop {
            tokio::select! {
                message = timeout(idle, read.next()) => {
                    match message {
                        Err(_) => {
                            debug!(timeout_ms = idle.as_millis(), "Subscription idle, recycling");
                            let _ = write.close().await;
                            return Exit::Dropped;
                        }

                        Ok(Some(Ok(Message::Text(text)))) => {
                            trace!(len = text.len(), "Frame received");
                            if !self.emit(TransportEvent::message(text.as_str())) {
                                let _ = write.close().await;
                                return Exit::Local;
                            }
                        }

                        Ok(Some(Ok(Message::Binary(bytes)))) => {
                            match String::from_utf8(bytes.to_vec()) {
                                Ok(text) => {
                                    if !self.emit(TransportEvent::message(text)) {
                                        let _ = write.close().await;
                                        return Exit::Local;
                                    }
                                }
                                Err(_) => warn!(len = bytes.len(), "Dropping non UTF-8 frame"),
                            }
                        }

                        Ok(Some(Ok(Message::Close(frame)))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            return Exit::Dropped;
                        }

                        Ok(Some(Err(e))) => return Exit::Failed(e.to_string()),

                        Ok(None) => {
                            debug!("WebSocket stream ended");
                            return Exit::Dropped;
                        }

                        // Ping, Pong, Frame
                        Ok(Some(Ok(_))) => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(Command::Push(data)) => {
                            if let Err(e) = write.send(Message::Text(data.clone().into())).await {
                                outbox.push_back(data);
                                return Exit::Failed(e.to_string());
                            }
                            trace!("Frame pushed");
                        }

                        Some(Command::Close) | None => {
                            debug!("Closing subscription");
                            let _ = write.close().await;
                            return Exit::Local;
                        }
                    }
                }
            }
        }
    }

    /// Returns `false` once nobody receives events.
    fn emit(&self, event: TransportEvent) -> bool {
        self.events_tx
            .send(event.via(TransportKind::WebSocket))
            .is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
