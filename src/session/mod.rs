//! Multiplexed session.
//!
//! This module provides the client side of the SwaggerSocket protocol:
//! the handshake, request correlation and listener dispatch.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | State machine driving one subscription |
//! | [`SessionOptions`] | Transport and logging configuration |
//! | [`Listener`] | Event hooks, all optional |
//! | [`Callbacks`] | Closure-based listener |
//! | [`PendingRegistry`] | In-flight requests by identifier |
//!
//! # Example
//!
//! ```ignore
//! use swaggersocket::{Callbacks, Request, Session, SessionOptions, WebSocketTransport};
//!
//! # async fn example() -> swaggersocket::Result<()> {
//! let (transport, mut events) = WebSocketTransport::new();
//! let mut session = Session::new(transport, SessionOptions::default())?;
//!
//! let listener = Callbacks::new()
//!     .with_open(|r| println!("open: {}", r.reason_phrase()))
//!     .shared();
//! session.open(Request::post("ws://localhost:8080/swaggersocket").with_listener(listener));
//!
//! while let Some(event) = events.recv().await {
//!     session.handle_event(event);
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Session state machine.
pub mod core;

/// Listener trait and fault-isolated dispatch.
pub mod listener;

/// Session configuration.
pub mod options;

/// Pending request registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Session, SessionState};
pub use listener::{Callbacks, Listener, NoopListener, SharedListener};
pub use options::{LogLevel, SessionOptions};
pub use registry::PendingRegistry;
