//! Transport collaborator.
//!
//! The session does not negotiate connections itself. It drives a
//! [`Transport`] that opens a subscription and hands back a
//! [`TransportHandle`] for additional frames, while inbound deliveries are
//! fed to [`Session::handle_event`](crate::Session::handle_event) as
//! [`TransportEvent`]s by whoever runs the event loop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   subscribe(handshake)   ┌─────────────────┐
//! │                 │─────────────────────────►│                 │
//! │    Session      │   push(requests/close)   │   Transport     │◄──► server
//! │                 │─────────────────────────►│                 │
//! │                 │◄─────────────────────────│                 │
//! └─────────────────┘      TransportEvent      └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | tokio-tungstenite transport with reconnection |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport.
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::NameValue;
use crate::protocol::wire::PROTOCOL_VERSION;
use crate::session::SessionOptions;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::{EventReceiver, WebSocketHandle, WebSocketTransport};

// ============================================================================
// Constants
// ============================================================================

/// Header (and query parameter) marking SwaggerSocket traffic.
pub const PROTOCOL_HEADER: &str = "SwaggerSocket";

// ============================================================================
// TransportKind
// ============================================================================

/// Wire transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Full-duplex WebSocket.
    #[default]
    #[serde(rename = "websocket")]
    WebSocket,
    /// HTTP long-polling.
    #[serde(rename = "long-polling")]
    LongPolling,
    /// HTTP streaming.
    #[serde(rename = "streaming")]
    Streaming,
    /// Server-sent events.
    #[serde(rename = "sse")]
    Sse,
    /// Periodic polling.
    #[serde(rename = "polling")]
    Polling,
}

impl TransportKind {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::LongPolling => "long-polling",
            Self::Streaming => "streaming",
            Self::Sse => "sse",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TransportState
// ============================================================================

/// Connection state reported with each delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportState {
    /// Connection established.
    #[serde(rename = "opening")]
    Opening,
    /// A message arrived.
    #[serde(rename = "messageReceived")]
    MessageReceived,
    /// The connection dropped and is being re-established.
    #[serde(rename = "re-opening")]
    Reopening,
    /// The connection is gone for good.
    #[serde(rename = "closed")]
    Closed,
    /// The transport gave up.
    #[serde(rename = "transportFailure")]
    TransportFailure,
    /// An error status was received.
    #[serde(rename = "error")]
    Error,
}

impl TransportState {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::MessageReceived => "messageReceived",
            Self::Reopening => "re-opening",
            Self::Closed => "closed",
            Self::TransportFailure => "transportFailure",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// One delivery from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Connection state.
    pub state: TransportState,
    /// Raw text received, possibly partial.
    pub response_body: String,
    /// Status code, on error states.
    pub status_code: Option<u16>,
    /// Reason phrase, on error states.
    pub reason_phrase: Option<String>,
    /// Transport that produced the delivery.
    pub transport: Option<TransportKind>,
}

impl TransportEvent {
    fn bare(state: TransportState) -> Self {
        Self {
            state,
            response_body: String::new(),
            status_code: None,
            reason_phrase: None,
            transport: None,
        }
    }

    /// Connection established.
    #[inline]
    #[must_use]
    pub fn opening() -> Self {
        Self::bare(TransportState::Opening)
    }

    /// Text received.
    #[inline]
    #[must_use]
    pub fn message(body: impl Into<String>) -> Self {
        Self {
            response_body: body.into(),
            ..Self::bare(TransportState::MessageReceived)
        }
    }

    /// Reconnection in progress.
    #[inline]
    #[must_use]
    pub fn reopening() -> Self {
        Self::bare(TransportState::Reopening)
    }

    /// Connection closed.
    #[inline]
    #[must_use]
    pub fn closed() -> Self {
        Self::bare(TransportState::Closed)
    }

    /// Transport gave up.
    #[inline]
    #[must_use]
    pub fn transport_failure(reason: impl Into<String>) -> Self {
        Self {
            reason_phrase: Some(reason.into()),
            ..Self::bare(TransportState::TransportFailure)
        }
    }

    /// Error status.
    #[inline]
    #[must_use]
    pub fn error(status_code: u16, reason: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            reason_phrase: Some(reason.into()),
            ..Self::bare(TransportState::Error)
        }
    }

    /// Tags the event with the producing transport.
    #[inline]
    #[must_use]
    pub fn via(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }
}

// ============================================================================
// SubscribeRequest
// ============================================================================

/// Everything the transport needs to open the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// URL or path to subscribe to.
    pub path: String,
    /// Subscription method.
    pub method: String,
    /// Headers sent with the subscription.
    pub headers: Vec<NameValue>,
    /// Preferred transport.
    pub transport: TransportKind,
    /// Fallback transport.
    pub fallback_transport: TransportKind,
    /// Fallback method.
    pub fallback_method: String,
    /// Inactivity timeout.
    pub timeout: Duration,
    /// Maximum connection attempts.
    pub max_request: u32,
    /// Reconnect after drops.
    pub reconnect: bool,
    /// Streaming response cap.
    pub max_streaming_length: u64,
    /// Cross-domain requests.
    pub enable_xdr: bool,
    /// Deliver before reconnecting.
    pub execute_callback_before_reconnect: bool,
    /// Credentials on cross-origin requests.
    pub with_credentials: bool,
    /// Length-prefixed messages.
    pub track_message_length: bool,
    /// Length-marker delimiter.
    pub message_delimiter: String,
    /// Connection establishment timeout.
    pub connect_timeout: Option<Duration>,
    /// Delay between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Strip transport bookkeeping headers.
    pub drop_headers: bool,
    /// Surface transport response headers.
    pub read_response_headers: bool,
    /// Initial payload (the serialized handshake).
    pub data: String,
}

impl SubscribeRequest {
    /// Builds the subscription from session options.
    ///
    /// Message-length tracking is always requested.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        method: impl Into<String>,
        options: &SessionOptions,
        data: String,
    ) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            headers: vec![NameValue::new(PROTOCOL_HEADER, PROTOCOL_VERSION)],
            transport: options.transport,
            fallback_transport: options.fallback_transport,
            fallback_method: options.fallback_method.clone(),
            timeout: options.timeout,
            max_request: options.max_request,
            reconnect: options.reconnect,
            max_streaming_length: options.max_streaming_length,
            enable_xdr: options.enable_xdr,
            execute_callback_before_reconnect: options.execute_callback_before_reconnect,
            with_credentials: options.with_credentials,
            track_message_length: true,
            message_delimiter: options.message_delimiter.clone(),
            connect_timeout: options.connect_timeout,
            reconnect_interval: options.reconnect_interval,
            drop_headers: options.drop_headers,
            read_response_headers: options.read_response_headers,
            data,
        }
    }
}

// ============================================================================
// PushRequest
// ============================================================================

/// An additional frame sent outside the subscription stream.
///
/// Always a fixed long-polling POST; responses arrive on the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Transport for the push.
    pub transport: TransportKind,
    /// Fallback transport for the push.
    pub fallback_transport: TransportKind,
    /// Push method.
    pub method: String,
    /// Headers sent with the push.
    pub headers: Vec<NameValue>,
    /// Frame payload.
    pub data: String,
}

impl PushRequest {
    /// Creates a push carrying `data`.
    #[must_use]
    pub fn new(data: String) -> Self {
        Self {
            transport: TransportKind::LongPolling,
            fallback_transport: TransportKind::LongPolling,
            method: "POST".to_string(),
            headers: vec![NameValue::new(PROTOCOL_HEADER, PROTOCOL_VERSION)],
            data,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Opens subscriptions.
pub trait Transport {
    /// Handle to an open subscription.
    type Handle: TransportHandle;

    /// Opens a subscription and sends `request.data` as its first frame.
    ///
    /// Returns once the subscription is scheduled; connection progress is
    /// reported through [`TransportEvent`]s.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot even be attempted
    /// (for example an unparsable URL).
    fn subscribe(&mut self, request: SubscribeRequest) -> Result<Self::Handle>;
}

/// An open subscription.
pub trait TransportHandle {
    /// Sends an additional frame. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the handle is closed.
    fn push(&mut self, request: PushRequest) -> Result<()>;

    /// Replaces method and payload used when the subscription is re-established.
    fn reopen_with(&mut self, method: &str, data: String);

    /// Terminates the subscription.
    fn close(&mut self);

    /// Returns `true` once [`close`](Self::close) was called or the
    /// transport terminated.
    fn is_closed(&self) -> bool;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_names() {
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
        assert_eq!(
            serde_json::to_string(&TransportKind::LongPolling).expect("serialize"),
            "\"long-polling\""
        );
        let kind: TransportKind = serde_json::from_str("\"sse\"").expect("parse");
        assert_eq!(kind, TransportKind::Sse);
    }

    #[test]
    fn test_transport_state_names() {
        assert_eq!(TransportState::Reopening.as_str(), "re-opening");
        assert_eq!(TransportState::MessageReceived.to_string(), "messageReceived");
    }

    #[test]
    fn test_event_constructors() {
        let event = TransportEvent::error(502, "Bad Gateway").via(TransportKind::WebSocket);
        assert_eq!(event.state, TransportState::Error);
        assert_eq!(event.status_code, Some(502));
        assert_eq!(event.reason_phrase.as_deref(), Some("Bad Gateway"));
        assert_eq!(event.transport, Some(TransportKind::WebSocket));

        let event = TransportEvent::message("{}");
        assert_eq!(event.response_body, "{}");
    }

    #[test]
    fn test_subscribe_request_from_options() {
        let options = SessionOptions::default();
        let request = SubscribeRequest::new("/ss", "POST", &options, "{}".into());

        assert!(request.track_message_length);
        assert_eq!(request.headers, vec![NameValue::new("SwaggerSocket", "1.0")]);
        assert_eq!(request.max_request, options.max_request);
        assert_eq!(request.data, "{}");
    }

    #[test]
    fn test_push_request_is_fixed_long_polling() {
        let push = PushRequest::new("x".into());
        assert_eq!(push.transport, TransportKind::LongPolling);
        assert_eq!(push.fallback_transport, TransportKind::LongPolling);
        assert_eq!(push.method, "POST");
    }
}
