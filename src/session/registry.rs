//! Pending request registry.
//!
//! Correlation table from request identifier to the in-flight [`Request`].
//! Keys are trimmed before every operation so that identifiers padded by a
//! misbehaving transport still resolve.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::identifiers::RequestId;
use crate::protocol::Request;

// ============================================================================
// PendingRegistry
// ============================================================================

/// In-flight requests keyed by normalized identifier.
///
/// Holds shared references; the caller's [`Request`] is never copied.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: FxHashMap<String, Arc<Request>>,
    /// Live entry count, kept alongside the map for diagnostics.
    count: usize,
}

impl PendingRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `request` under `id`.
    ///
    /// Returns the request previously registered under the same key,
    /// which means the same identifier was sent twice.
    pub fn put(&mut self, id: &RequestId, request: Arc<Request>) -> Option<Arc<Request>> {
        let previous = self.entries.insert(id.normalized().to_string(), request);
        if previous.is_none() {
            self.count += 1;
        }
        previous
    }

    /// Looks up a request.
    #[inline]
    #[must_use]
    pub fn get(&self, id: &RequestId) -> Option<&Arc<Request>> {
        self.entries.get(id.normalized())
    }

    /// Removes and returns a request.
    pub fn remove(&mut self, id: &RequestId) -> Option<Arc<Request>> {
        let previous = self.entries.remove(id.normalized());
        if previous.is_some() {
            self.count -= 1;
        }
        previous
    }

    /// Returns `true` if a request is registered under `id`.
    #[inline]
    #[must_use]
    pub fn contains_key(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id.normalized())
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }

    /// Number of live entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.count, self.entries.len());
        self.count
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
