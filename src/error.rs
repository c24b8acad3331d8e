//! Error types for SwaggerSocket sessions.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Session operations (`open`, `send`, `close`) never return these errors.
//! They are converted into a synthesized [`Response`](crate::Response) and
//! delivered through the request's [`Listener`](crate::Listener). Internal
//! seams (codec, transport) return [`Result<T>`]:
//!
//! ```ignore
//! use swaggersocket::{Result, protocol::codec};
//!
//! fn frame(request: &Request, identity: &Identity) -> Result<String> {
//!     codec::encode_request(request, identity)
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Session | [`Error::HandshakeRejected`], [`Error::SendBeforeOpen`], [`Error::AlreadyOpen`] |
//! | Protocol | [`Error::MalformedFrame`], [`Error::UnknownRequest`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::TransportFailure`] |
//! | Listener | [`Error::ListenerFault`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Reason phrase reported when `send` is called before the handshake completed.
pub const SEND_BEFORE_OPEN_REASON: &str = "The open operation hasn't completed yet. \
     Make sure your Listener::on_open has been invoked first.";

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session options or a request are unusable.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The server answered the handshake with a non-200 status.
    #[error("Handshake rejected: {status_code} {reason}")]
    HandshakeRejected {
        /// Status code from the acknowledgment.
        status_code: u16,
        /// Reason phrase from the acknowledgment.
        reason: String,
    },

    /// A request was sent before the session identity was assigned.
    #[error("{}", SEND_BEFORE_OPEN_REASON)]
    SendBeforeOpen,

    /// `open` was called while a handshake or connection is active.
    #[error("Session already open")]
    AlreadyOpen,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame could not be decoded and is not a partial message.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the decode failure.
        message: String,
    },

    /// A response referenced a request identifier with no registry entry.
    #[error("Response for unknown request: {request_id}")]
    UnknownRequest {
        /// The unmatched request identifier.
        request_id: RequestId,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection could not be established or a frame could not be written.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport handle already closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Transport gave up on the connection.
    #[error("Transport failure: {message}")]
    TransportFailure {
        /// Description reported by the transport.
        message: String,
    },

    // ========================================================================
    // Listener Errors
    // ========================================================================
    /// A listener hook panicked. Logged, never propagated.
    #[error("Listener hook `{hook}` panicked: {message}")]
    ListenerFault {
        /// Name of the hook that faulted.
        hook: &'static str,
        /// Panic payload, when it was a string.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Invalid subscription URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake rejected error.
    #[inline]
    pub fn handshake_rejected(status_code: u16, reason: impl Into<String>) -> Self {
        Self::HandshakeRejected {
            status_code,
            reason: reason.into(),
        }
    }

    /// Creates a malformed frame error.
    #[inline]
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates an unknown request error.
    #[inline]
    pub fn unknown_request(request_id: RequestId) -> Self {
        Self::UnknownRequest { request_id }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a transport failure error.
    #[inline]
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
        }
    }

    /// Creates a listener fault error.
    #[inline]
    pub fn listener_fault(hook: &'static str, message: impl Into<String>) -> Self {
        Self::ListenerFault {
            hook,
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::TransportFailure { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the session survives this error.
    ///
    /// Non-recoverable errors leave the session closed; a fresh `open` is needed.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SendBeforeOpen
                | Self::MalformedFrame { .. }
                | Self::UnknownRequest { .. }
                | Self::TransportFailure { .. }
                | Self::ListenerFault { .. }
        )
    }

    /// Status code reported to listeners when this error is surfaced
    /// as a synthesized response.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::HandshakeRejected { status_code, .. } => *status_code,
            Self::Config { .. } | Self::MalformedFrame { .. } | Self::Json(_) => 400,
            Self::UnknownRequest { .. } => 404,
            Self::AlreadyOpen => 409,
            Self::ListenerFault { .. } | Self::Io(_) => 500,
            Self::SendBeforeOpen
            | Self::Connection { .. }
            | Self::ConnectionClosed
            | Self::TransportFailure { .. }
            | Self::WebSocket(_)
            | Self::Url(_) => 503,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
