//! Type-safe identifier wrappers.
//!
//! Newtypes prevent mixing request identifiers with session identities,
//! even though both travel as strings on the wire.
//!
//! | Type | Assigned by | Scope |
//! |------|-------------|-------|
//! | [`RequestId`] | Client, at request construction | One request/response exchange |
//! | [`Identity`] | Server, in the handshake acknowledgment | One session |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// RequestId
// ============================================================================

/// Identifier correlating a request with its responses.
///
/// Generated as a random UUID v4, but any string received from the wire
/// is accepted so that server-echoed identifiers round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a new random request identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier with surrounding whitespace removed.
    ///
    /// Registry lookups always use the normalized form.
    #[inline]
    #[must_use]
    pub fn normalized(&self) -> &str {
        self.0.trim()
    }
}

impl From<String> for RequestId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RequestId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Server-assigned session identity.
///
/// Unassigned until a handshake acknowledgment with status 200 arrives.
/// The handshake itself always carries [`Identity::UNASSIGNED`] (`"0"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wire value used before the server assigned an identity.
    pub const UNASSIGNED: &'static str = "0";

    /// Creates an identity from a server-provided value.
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the placeholder identity sent with the handshake.
    #[inline]
    #[must_use]
    pub fn unassigned() -> Self {
        Self(Self::UNASSIGNED.to_string())
    }

    /// Returns the identity as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
