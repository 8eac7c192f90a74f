//! Type-safe identifiers.
//!
//! Newtype wrappers keep message ids, endpoint ids, context ids and
//! responder ids from being mixed up at compile time.
//!
//! | Type | Backing | Scope |
//! |------|---------|-------|
//! | [`MessageId`] | UUID v4 | one request/response pair |
//! | [`EndpointId`] | `u64` counter | one endpoint adapter |
//! | [`ContextId`] | `u32` counter | one execution context |
//! | [`ResponderId`] | handler address | one responder registration |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Counters
// ============================================================================

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

// ============================================================================
// MessageId
// ============================================================================

/// Identifier shared by a request and its response.
///
/// Only needs to be unique among the requests in flight on one messenger,
/// but a random UUID makes collisions across contexts irrelevant too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// EndpointId
// ============================================================================

/// Identity of one endpoint adapter.
///
/// Used by the hub to avoid onboarding the same forwarding source twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    /// Allocates the next process-unique endpoint id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

// ============================================================================
// ContextId
// ============================================================================

/// Identity of one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    /// Allocates the next process-unique context id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

// ============================================================================
// ResponderId
// ============================================================================

/// Identity of a responder handler.
///
/// Derived from the address of the handler's shared allocation; stable for
/// as long as any clone of the responder is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponderId(usize);

impl ResponderId {
    /// Creates an id from a raw handler address.
    #[inline]
    #[must_use]
    pub(crate) const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }
}

impl fmt::Display for ResponderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "responder-{:x}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_unique() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_id_serializes_as_string() {
        let id = MessageId::generate();
        let json = serde_json::to_value(id).expect("serialize");
        assert_eq!(json.as_str(), Some(id.to_string().as_str()));

        let parsed: MessageId = serde_json::from_value(json).expect("parse");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_message_id_rejects_non_uuid() {
        let parsed = serde_json::from_str::<MessageId>(r#""not-a-uuid""#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_endpoint_ids_increase() {
        let a = EndpointId::next();
        let b = EndpointId::next();
        assert!(b > a);
        assert!(a.to_string().starts_with("endpoint-"));
    }

    #[test]
    fn test_context_ids_increase() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert!(b.as_u32() > a.as_u32());
    }
}
