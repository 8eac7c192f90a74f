//! Payload data and transferable resources.
//!
//! A [`Payload`] is what a request carries and what it resolves to: JSON
//! data plus a list of [`Transferable`] resources that travel out of band,
//! the way a host `postMessage` transfer list does.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

// ============================================================================
// Transferable
// ============================================================================

/// A resource moved (not copied) to the receiving context.
///
/// The buffer is shared, so a transferable that crosses any number of relay
/// hops is still the same allocation on arrival; see [`Transferable::same_resource`].
#[derive(Clone, PartialEq, Eq)]
pub struct Transferable {
    bytes: Arc<[u8]>,
}

impl Transferable {
    /// Wraps a buffer.
    #[inline]
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Returns the buffer contents.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the buffer length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the buffer is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns `true` if both handles refer to the same underlying resource.
    #[inline]
    #[must_use]
    pub fn same_resource(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for Transferable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transferable")
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Request or response data together with its transfer list.
///
/// Handlers may return a bare [`Value`] (converted with an empty transfer
/// list) or a full `Payload` when the reply moves resources back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// JSON data.
    pub data: Value,
    /// Resources moved alongside the data.
    pub transfer: Vec<Transferable>,
}

impl Payload {
    /// Creates a payload without transferables.
    #[inline]
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            data,
            transfer: Vec::new(),
        }
    }

    /// Attaches a transfer list.
    #[inline]
    #[must_use]
    pub fn with_transfer(mut self, transfer: Vec<Transferable>) -> Self {
        self.transfer = transfer;
        self
    }

    /// Returns `true` if resources travel with this payload.
    #[inline]
    #[must_use]
    pub fn has_transfer(&self) -> bool {
        !self.transfer.is_empty()
    }
}

impl From<Value> for Payload {
    fn from(data: Value) -> Self {
        Self::new(data)
    }
}

// ============================================================================
// Tests
// ============================================================================
