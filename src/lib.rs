//! SwaggerSocket client - request multiplexing over one persistent connection.
//!
//! This library implements the client side of the SwaggerSocket protocol:
//! many independent request/response exchanges share a single WebSocket
//! subscription and are correlated by request identifier.
//!
//! # Architecture
//!
//! The session follows an event-driven model:
//!
//! - **Session**: handshake, identity, pending requests, listener dispatch
//! - **Transport**: opens the subscription, pushes frames, reports deliveries
//!
//! Key design principles:
//!
//! - Responses arrive only through [`Listener`] hooks; nothing blocks on a reply
//! - Correlation is by request identifier, never by arrival order
//! - Partial deliveries are buffered until they form a complete message
//! - A panicking listener never breaks dispatch to other requests
//!
//! # Quick Start
//!
//! ```no_run
//! use swaggersocket::{Callbacks, Request, Result, Session, SessionOptions, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (transport, mut events) = WebSocketTransport::new();
//!     let mut session = Session::new(transport, SessionOptions::default())?;
//!
//!     let listener = Callbacks::new()
//!         .with_open(|r| println!("open: {}", r.status_code()))
//!         .with_response(|r| println!("{}", r.body_text()))
//!         .shared();
//!     session.open(Request::post("ws://localhost:8080/swaggersocket").with_listener(listener));
//!
//!     while let Some(event) = events.recv().await {
//!         session.handle_event(event);
//!         if session.is_open() {
//!             session.send(Request::post("/echo").with_data_format("text/plain").with_data("hi"));
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Messages, wire envelopes and codec |
//! | [`session`] | Session state machine and listeners |
//! | [`transport`] | Transport traits and the WebSocket transport |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// Internal seams return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for requests and sessions.
pub mod identifiers;

/// Protocol messages, wire envelopes and codec.
pub mod protocol;

/// Session state machine, listeners and configuration.
///
/// Use [`Session::new()`] and [`Session::open()`] to start.
pub mod session;

/// Transport collaborator.
///
/// Traits the session drives, plus a tokio-tungstenite implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Identity, RequestId};

// Protocol types
pub use protocol::{NameValue, Request, Response};

// Session types
pub use session::{
    Callbacks, Listener, LogLevel, NoopListener, PendingRegistry, Session, SessionOptions,
    SessionState, SharedListener,
};

// Transport types
pub use transport::{
    EventReceiver, PushRequest, SubscribeRequest, Transport, TransportEvent, TransportHandle,
    TransportKind, TransportState, WebSocketHandle, WebSocketTransport,
};
