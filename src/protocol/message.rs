//! Protocol message type.
//!
//! Every unit exchanged between contexts is a [`Message`].
//!
//! # Format
//!
//! ```json
//! {
//!   "id": "uuid",
//!   "type": "echo",
//!   "payload": { ... },
//!   "__type": "request",
//!   "__identifier": "post-relay"
//! }
//! ```
//!
//! `payload` is omitted entirely on a metadata-only message, which tells a
//! relay-aware receiver to fetch it from the hub by `id`. An explicit
//! `null` payload is a present payload. Transferables never appear in the
//! JSON; they travel next to it.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::MessageId;

use super::payload::{Payload, Transferable};

// ============================================================================
// Constants
// ============================================================================

/// Module tag stamped on every message of this protocol.
pub const IDENTIFIER: &str = "post-relay";

// ============================================================================
// MessageKind
// ============================================================================

/// Tells a response apart from an independent request of the same type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Initiated by a requester.
    Request,
    /// Reply to a request, reusing its id.
    Response,
}

// ============================================================================
// Message
// ============================================================================

/// A request or response travelling between contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation id; a response copies its request's id.
    pub id: MessageId,

    /// Application-chosen operation name, shared by request and response.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Data, or `None` when only metadata was sent.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Value>,

    /// Request/response marker.
    #[serde(rename = "__type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,

    /// Module tag; must equal [`IDENTIFIER`].
    #[serde(rename = "__identifier")]
    pub identifier: String,

    /// Failure text from the remote handler (responses only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Resources moved with the message, carried outside the JSON.
    #[serde(skip)]
    pub transfer: Option<Vec<Transferable>>,
}

/// Maps a present JSON field (including `null`) to `Some`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Normalizes an empty transfer list to `None`.
fn non_empty(transfer: Vec<Transferable>) -> Option<Vec<Transferable>> {
    (!transfer.is_empty()).then_some(transfer)
}

// ============================================================================
// Message - Constructors
// ============================================================================

impl Message {
    /// Creates a request with a fresh id.
    #[must_use]
    pub fn request(message_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: MessageId::generate(),
            message_type: message_type.into(),
            payload: Some(payload.data),
            kind: Some(MessageKind::Request),
            identifier: IDENTIFIER.to_string(),
            error: None,
            transfer: non_empty(payload.transfer),
        }
    }

    /// Creates the response to `request`, reusing its id and type.
    #[must_use]
    pub fn response_to(request: &Self, payload: Payload) -> Self {
        Self {
            id: request.id,
            message_type: request.message_type.clone(),
            payload: Some(payload.data),
            kind: Some(MessageKind::Response),
            identifier: request.identifier.clone(),
            error: None,
            transfer: non_empty(payload.transfer),
        }
    }

    /// Creates a failed response to `request`.
    #[must_use]
    pub fn error_response_to(request: &Self, error: impl Into<String>) -> Self {
        Self {
            id: request.id,
            message_type: request.message_type.clone(),
            payload: Some(Value::Null),
            kind: Some(MessageKind::Response),
            identifier: request.identifier.clone(),
            error: Some(error.into()),
            transfer: None,
        }
    }

    /// Returns a copy with payload and transferables stripped.
    #[must_use]
    pub fn metadata(&self) -> Self {
        Self {
            id: self.id,
            message_type: self.message_type.clone(),
            payload: None,
            kind: self.kind,
            identifier: self.identifier.clone(),
            error: self.error.clone(),
            transfer: None,
        }
    }
}

// ============================================================================
// Message - Accessors
// ============================================================================

impl Message {
    /// Returns `true` for a request.
    #[inline]
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.kind == Some(MessageKind::Request)
    }

    /// Returns `true` for a response.
    #[inline]
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.kind == Some(MessageKind::Response)
    }

    /// Returns `true` if transferables travel with this message.
    #[inline]
    #[must_use]
    pub fn carries_transfer(&self) -> bool {
        self.transfer.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Returns `true` if this message still needs its payload fetched.
    #[inline]
    #[must_use]
    pub fn is_metadata_only(&self) -> bool {
        self.payload.is_none()
    }

    /// Consumes the message into its payload.
    ///
    /// A missing payload becomes `null`.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        Payload {
            data: self.payload.unwrap_or(Value::Null),
            transfer: self.transfer.unwrap_or_default(),
        }
    }
}

// ============================================================================
// Message - Wire Conversion
// ============================================================================

impl Message {
    /// Splits the message into wire JSON and its out-of-band transfer list.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the payload cannot be serialized.
    pub fn into_wire(mut self) -> Result<(Value, Vec<Transferable>)> {
        let transfer = self.transfer.take().unwrap_or_default();
        let data = serde_json::to_value(&self)?;
        Ok((data, transfer))
    }

    /// Recognizes a message of this protocol in inbound data.
    ///
    /// Returns `None` for any other traffic sharing the transport.
    #[must_use]
    pub fn from_wire(data: &Value, transfer: Vec<Transferable>) -> Option<Self> {
        if data.get("__identifier").and_then(Value::as_str) != Some(IDENTIFIER) {
            return None;
        }

        let mut message = Self::deserialize(data).ok()?;
        message.transfer = non_empty(transfer);
        Some(message)
    }
}

// ============================================================================
// Tests
// ============================================================================
