//! SwaggerSocket protocol messages.
//!
//! This module defines the value types exchanged with a SwaggerSocket
//! server and their JSON wire form.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `handshake` | Client → Server | Announce protocol, request an identity |
//! | `status` | Server → Client | Handshake acknowledgment, or per-request status |
//! | `requests` | Client → Server | One or more requests under the session identity |
//! | `responses` | Server → Client | Responses correlated by request `uuid` |
//! | `heartbeat` | Server → Client | Keep-alive |
//! | `close` | Client → Server | Session teardown |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | [`Request`] and [`Response`] value types |
//! | `wire` | Serde envelopes |
//! | `codec` | Encoding and partial-frame decoding |

// ============================================================================
// Submodules
// ============================================================================

/// Encoding and decoding of frames.
pub mod codec;

/// Request and Response value types.
pub mod message;

/// Serde wire envelopes.
pub mod wire;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Decoded, Delivery, FrameDecoder, Inbound};
pub use message::{NameValue, Request, Response};
pub use wire::{CloseMessage, Handshake, PROTOCOL_NAME, PROTOCOL_VERSION};
