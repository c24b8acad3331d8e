//! Session state machine.
//!
//! A [`Session`] owns one transport subscription, the identity the server
//! assigns after the handshake, the pending request registry and the
//! partial-frame decoder.
//!
//! # States
//!
//! ```text
//!          open()             ack 200
//!   Idle ───────────► Handshaking ─────────► Open ◄──────┐
//!    ▲                    │                   │  │        │ opening
//!    └─── ack != 200 ─────┘      re-opening   │  └──► Reopening
//!                                             │
//!                        close() / closed     ▼
//!                                           Closed
//! ```
//!
//! Nothing escapes `open`, `send` or `close` as an error: every failure is
//! reported through the listener of the request involved, or the listener
//! attached to the request passed to `open`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{Identity, RequestId};
use crate::protocol::codec::{self, Decoded, Delivery, FrameDecoder, Inbound};
use crate::protocol::wire::{CloseMessage, Handshake, Heartbeat, StatusMessage, WireResponse};
use crate::protocol::{Request, Response};
use crate::transport::{
    PushRequest, SubscribeRequest, Transport, TransportEvent, TransportHandle, TransportState,
};

use super::listener::{Dispatcher, Listener, SharedListener, or_noop};
use super::options::{LogLevel, SessionOptions};
use super::registry::PendingRegistry;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not connected.
    #[default]
    Idle,
    /// Handshake sent, waiting for the acknowledgment.
    Handshaking,
    /// Identity assigned; requests may be sent.
    Open,
    /// The transport is re-establishing a dropped subscription.
    Reopening,
    /// Close message being sent.
    Closing,
    /// Torn down; a fresh `open` is required.
    Closed,
}

impl SessionState {
    /// Returns a lowercase label for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Reopening => "re-opening",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Returns `true` if `open` may be called.
    #[inline]
    #[must_use]
    pub const fn can_open(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session
// ============================================================================

/// A multiplexed request/response session over one transport subscription.
///
/// The session is driven by its owner: call [`open`](Self::open), feed every
/// transport delivery to [`handle_event`](Self::handle_event), and
/// [`send`](Self::send) requests once `on_open` has fired.
///
/// # Example
///
/// ```ignore
/// let (transport, mut events) = WebSocketTransport::new();
/// let mut session = Session::new(transport, SessionOptions::default())?;
///
/// session.open(Request::post("ws://localhost:8080/swaggersocket").with_listener(listener));
/// while let Some(event) = events.recv().await {
///     session.handle_event(event);
/// }
/// ```
pub struct Session<T: Transport> {
    transport: T,
    handle: Option<T::Handle>,
    options: SessionOptions,
    state: SessionState,
    identity: Option<Identity>,
    registry: PendingRegistry,
    decoder: FrameDecoder,
    /// Request passed to `open`; its listener receives session events.
    open_request: Option<Arc<Request>>,
    dispatcher: Dispatcher,
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("pending", &self.registry.len())
            .field("buffered", &self.decoder.pending().len())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Session<T> {
    /// Creates an idle session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` fail validation.
    pub fn new(transport: T, options: SessionOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            transport,
            handle: None,
            decoder: FrameDecoder::new(options.message_delimiter.clone()).with_max_buffered(
                usize::try_from(options.max_streaming_length).unwrap_or(usize::MAX),
            ),
            dispatcher: Dispatcher::new(options.log_level),
            options,
            state: SessionState::Idle,
            identity: None,
            registry: PendingRegistry::new(),
            open_request: None,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identity assigned by the server, once the handshake succeeded.
    #[inline]
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Returns `true` if requests can be sent.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.identity.is_some() && matches!(self.state, SessionState::Open | SessionState::Reopening)
    }

    /// Number of requests awaiting their final response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Looks up a pending request.
    #[inline]
    #[must_use]
    pub fn pending(&self, id: &RequestId) -> Option<&Arc<Request>> {
        self.registry.get(id)
    }

    /// Session configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The transport collaborator.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Opens the subscription and sends the handshake built from `request`.
    ///
    /// The listener attached to `request` receives `on_open`, `on_close`,
    /// transport failures, and responses nobody else claims. Ignored unless
    /// the session is idle or closed.
    pub fn open(&mut self, request: Request) {
        if !self.state.can_open() {
            let error = Error::AlreadyOpen;
            warn!(state = %self.state, %error, "Ignoring open");
            return;
        }

        let request = Arc::new(request);
        let handshake = Handshake::from_request(&request);

        let subscription = codec::encode_handshake(&handshake).map(|data| {
            SubscribeRequest::new(request.path(), request.method(), &self.options, data)
        });
        let handle = subscription.and_then(|s| self.transport.subscribe(s));

        self.open_request = Some(Arc::clone(&request));
        self.identity = None;
        self.decoder.reset();

        match handle {
            Ok(handle) => {
                debug!(path = request.path(), method = request.method(), "Handshake sent");
                self.handle = Some(handle);
                self.state = SessionState::Handshaking;
            }
            Err(error) => {
                warn!(%error, path = request.path(), "Subscription failed");
                self.state = SessionState::Idle;
                let response = Response::synthesized(error.status_code(), error.to_string());
                self.dispatcher.error(or_noop(request.listener()), &response);
            }
        }
    }

    /// Opens a session on `path` with a default POST request.
    pub fn open_path(&mut self, path: impl Into<String>) {
        self.open(Request::post(path));
    }

    /// Sends one request.
    ///
    /// Responses arrive through [`handle_event`](Self::handle_event), never
    /// as a reply to this call.
    pub fn send(&mut self, request: Request) {
        self.send_all(vec![Arc::new(request)]);
    }

    /// Sends several requests in one frame.
    pub fn send_batch(&mut self, requests: impl IntoIterator<Item = Request>) {
        self.send_all(requests.into_iter().map(Arc::new).collect());
    }

    /// Sends the close message and tears the subscription down.
    ///
    /// Calling `close` again is a no-op.
    pub fn close(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            debug!(state = %self.state, "Close on inactive session");
            return;
        };

        if !handle.is_closed() {
            self.state = SessionState::Closing;
            if let Some(identity) = self.identity.clone() {
                let close = CloseMessage::new(CloseMessage::UNLOAD, identity);
                match codec::encode_close(&close) {
                    Ok(frame) => {
                        if let Err(error) = handle.push(PushRequest::new(frame)) {
                            debug!(%error, "Close message not delivered");
                        }
                    }
                    Err(error) => warn!(%error, "Failed to encode close message"),
                }
            }
            handle.close();
        }

        info!(identity = ?self.identity, "Session closed");
        self.teardown();
    }

    /// Processes one transport delivery.
    pub fn handle_event(&mut self, event: TransportEvent) {
        trace!(
            state = %event.state,
            transport = ?event.transport,
            status = ?event.status_code,
            body = %event.response_body,
            "Transport event"
        );

        if self.handle.is_none() {
            debug!(state = %event.state, session = %self.state, "Event on inactive session");
            return;
        }

        // A partial message means the next body completes it, whatever the
        // transport labels the delivery.
        let state = if self.decoder.has_pending() && !event.response_body.is_empty() {
            TransportState::MessageReceived
        } else {
            event.state
        };

        match state {
            TransportState::MessageReceived => self.on_message(&event.response_body),
            TransportState::Opening => {
                if self.state == SessionState::Reopening {
                    self.state = if self.identity.is_some() {
                        SessionState::Open
                    } else {
                        SessionState::Handshaking
                    };
                    debug!(state = %self.state, "Subscription re-established");
                }
            }
            TransportState::Reopening => {
                if let Some(handle) = self.handle.as_mut() {
                    handle.reopen_with("GET", String::new());
                }
                self.state = SessionState::Reopening;
                debug!("Subscription re-opening");
            }
            TransportState::Closed => self.on_transport_closed(),
            TransportState::TransportFailure => self.on_transport_failure(&event),
            TransportState::Error => {
                let response = Response::synthesized(
                    event.status_code.unwrap_or(500),
                    event.reason_phrase.clone().unwrap_or_default(),
                );
                warn!(
                    status = response.status_code(),
                    reason = response.reason_phrase(),
                    "Transport error"
                );
                self.dispatcher.error(self.session_listener(), &response);
            }
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    fn send_all(&mut self, requests: Vec<Arc<Request>>) {
        if requests.is_empty() {
            return;
        }

        let identity = match self.sendable() {
            Ok(identity) => identity,
            Err(error) => {
                warn!(%error, count = requests.len(), "Send rejected");
                self.fail_requests(&requests, &error);
                return;
            }
        };

        let frame = match requests.as_slice() {
            [request] => codec::encode_request(request, &identity),
            _ => codec::encode_batch(requests.iter().map(|r| &**r), &identity),
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "Failed to encode requests");
                self.fail_requests(&requests, &error);
                return;
            }
        };

        for request in &requests {
            if self.registry.put(request.id(), Arc::clone(request)).is_some() {
                warn!(request_id = %request.id(), "Duplicate request id, previous entry replaced");
            }
        }

        let pushed = match self.handle.as_mut() {
            Some(handle) => handle.push(PushRequest::new(frame)),
            None => Err(Error::ConnectionClosed),
        };

        match pushed {
            Ok(()) => trace!(count = requests.len(), "Requests pushed"),
            Err(error) => {
                warn!(%error, "Push failed");
                for request in &requests {
                    self.registry.remove(request.id());
                }
                self.fail_requests(&requests, &error);

                if error.is_connection_error() && !error.is_recoverable() {
                    warn!(%error, "Transport unusable, closing session");
                    if let Some(handle) = self.handle.as_mut() {
                        handle.close();
                    }
                    self.teardown();
                }
            }
        }
    }

    /// Returns the identity to send under, or why sending is impossible.
    fn sendable(&self) -> Result<Identity> {
        let identity = self.identity.clone().ok_or(Error::SendBeforeOpen)?;
        match &self.handle {
            Some(handle) if !handle.is_closed() => Ok(identity),
            _ => Err(Error::ConnectionClosed),
        }
    }

    fn fail_requests(&self, requests: &[Arc<Request>], error: &Error) {
        for request in requests {
            let response = Response::synthesized(error.status_code(), error.to_string())
                .with_request(Some(Arc::clone(request)));
            self.dispatcher.error(self.listener_for(&response), &response);
        }
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    fn on_message(&mut self, body: &str) {
        match self.decoder.decode(body) {
            Decoded::Incomplete => {
                trace!(buffered = self.decoder.pending().len(), "Buffering partial message");
            }
            Decoded::Malformed(error) => warn!(%error, "Dropping frame"),
            Decoded::Parsed(Inbound::Status(status)) => self.on_status(status),
            Decoded::Parsed(Inbound::Heartbeat(heartbeat)) => self.on_heartbeat(&heartbeat),
            Decoded::Parsed(Inbound::Responses { identity, delivery }) => {
                if let (Some(theirs), Some(ours)) = (identity.as_deref(), &self.identity)
                    && theirs != ours.as_str()
                {
                    debug!(theirs, ours = %ours, "Responses for another identity");
                }
                self.on_responses(delivery);
            }
        }
    }

    fn on_status(&mut self, message: StatusMessage) {
        let StatusMessage { status, identity } = message;

        // Once open, a status naming a pending request reports that request.
        if matches!(self.state, SessionState::Open | SessionState::Reopening)
            && let Some(id) = identity.as_deref().map(RequestId::from)
            && self.registry.contains_key(&id)
        {
            let request = self.registry.remove(&id);
            let response = Response::synthesized(status.status_code, status.reason_phrase)
                .with_request(request);
            debug!(request_id = %id, status = response.status_code(), "Request status");
            self.dispatcher.response(self.listener_for(&response), &response);
            return;
        }

        let response = Response::synthesized(status.status_code, status.reason_phrase)
            .with_request(self.open_request.clone());

        if response.status_code() == 200 {
            self.identity = identity.map(Identity::new);
            if self.identity.is_none() {
                warn!("Handshake acknowledged without identity");
            }
            self.state = SessionState::Open;
            info!(identity = ?self.identity, "Session open");
            self.dispatcher.open(self.session_listener(), &response);
        } else {
            let error = Error::handshake_rejected(response.status_code(), response.reason_phrase());
            warn!(%error, "Handshake failed");
            if let Some(mut handle) = self.handle.take() {
                handle.close();
            }
            self.identity = None;
            self.state = SessionState::Idle;
            self.decoder.reset();
            self.dispatcher.error(self.session_listener(), &response);
        }
    }

    fn on_heartbeat(&self, heartbeat: &Heartbeat) {
        match self.options.log_level {
            LogLevel::Debug => debug!(
                heartbeat = %heartbeat.heartbeat,
                identity = ?heartbeat.identity,
                "Heartbeat"
            ),
            LogLevel::Info => trace!(heartbeat = %heartbeat.heartbeat, "Heartbeat"),
        }
    }

    fn on_responses(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Single(wire) => {
                let response = self.resolve(wire);
                self.dispatcher.response(self.listener_for(&response), &response);
            }
            Delivery::Batch(wires) => {
                let responses: Vec<Response> = wires.into_iter().map(|w| self.resolve(w)).collect();
                for response in &responses {
                    self.dispatcher.response(self.listener_for(response), response);
                }
                if responses.is_empty() {
                    return;
                }

                let listener = responses
                    .iter()
                    .rev()
                    .find_map(|r| r.request().and_then(|request| request.listener()))
                    .or_else(|| self.session_request_listener());
                self.dispatcher.responses(or_noop(listener), &responses);
            }
        }
    }

    /// Correlates a wire response with its pending request.
    ///
    /// The entry is only released by the final response of a stream.
    fn resolve(&mut self, wire: WireResponse) -> Response {
        let last = wire.last.unwrap_or(true);
        let request = if last {
            self.registry.remove(&wire.uuid)
        } else {
            self.registry.get(&wire.uuid).cloned()
        };

        if request.is_none() {
            let error = Error::unknown_request(wire.uuid.clone());
            warn!(%error, "Uncorrelated response");
        }

        Response::from_wire(wire, request)
    }

    // ========================================================================
    // Transport Signals
    // ========================================================================

    fn on_transport_closed(&mut self) {
        if let Some(mut handle) = self.handle.take()
            && !handle.is_closed()
        {
            handle.close();
        }
        info!(identity = ?self.identity, "Transport closed");

        let response = Response::synthesized(503, "close");
        self.dispatcher.close(self.session_listener(), &response);
        self.teardown();
    }

    fn on_transport_failure(&mut self, event: &TransportEvent) {
        let error = Error::transport_failure(event.reason_phrase.clone().unwrap_or_default());
        warn!(%error, transport = ?event.transport, "Transport failure");
        self.dispatcher
            .transport_failure(self.session_listener(), event);

        // The transport gave up for good.
        if self.handle.as_ref().is_some_and(TransportHandle::is_closed) {
            self.handle = None;
            self.teardown();
        }
    }

    fn teardown(&mut self) {
        self.handle = None;
        self.state = SessionState::Closed;
        self.identity = None;
        self.registry.clear();
        self.decoder.reset();
    }

    // ========================================================================
    // Listener Resolution
    // ========================================================================

    fn session_request_listener(&self) -> Option<&SharedListener> {
        self.open_request.as_ref().and_then(|r| r.listener())
    }

    fn session_listener(&self) -> &dyn Listener {
        or_noop(self.session_request_listener())
    }

    /// The response's request listener, else the session listener.
    fn listener_for<'a>(&'a self, response: &'a Response) -> &'a dyn Listener {
        or_noop(
            response
                .request()
                .and_then(|request| request.listener())
                .or_else(|| self.session_request_listener()),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
