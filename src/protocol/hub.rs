//! Hub store/fetch wire types.
//!
//! Forwarded hub operations are ordinary requests with reserved types:
//!
//! | Type | Request payload | Reply payload |
//! |------|-----------------|---------------|
//! | [`STORE_MESSAGE_TYPE`] | full message (transfer list as request transfer) | [`StoreReply`] |
//! | [`FETCH_MESSAGE_TYPE`] | message id | [`FetchReply`] (transfer list as response transfer) |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

use super::message::Message;
use super::payload::Payload;

// ============================================================================
// Constants
// ============================================================================

/// Request type for storing a message in the hub.
pub const STORE_MESSAGE_TYPE: &str = "post-relay:__store";

/// Request type for fetching a stored message from the hub.
pub const FETCH_MESSAGE_TYPE: &str = "post-relay:__fetch";

/// Signal a relay page posts to its parent once its hub is bound.
pub const READY_SIGNAL: &str = "loadend";

// ============================================================================
// StoreReply
// ============================================================================

/// Result of a store request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReply {
    /// Whether the message was stored.
    pub ok: bool,
    /// Failure reason when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreReply {
    /// Builds a reply from a store outcome.
    #[must_use]
    pub fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(e) => Self {
                ok: false,
                error: Some(e.relay_reason()),
            },
        }
    }

    /// Converts the reply back into a store outcome for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreFailed`] if the reply reports failure.
    pub fn into_result(self, id: MessageId) -> Result<()> {
        if self.ok {
            Ok(())
        } else {
            let reason = self.error.unwrap_or_else(|| "unknown error".to_string());
            Err(Error::store_failed(id, reason))
        }
    }
}

// ============================================================================
// FetchReply
// ============================================================================

/// Result of a fetch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchReply {
    /// Whether the message was found.
    pub ok: bool,
    /// The stored message (without its transfer list).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// Failure reason when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchReply {
    /// Builds the reply payload for a fetch outcome.
    ///
    /// The fetched message's transferables become the reply's transfer list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the reply cannot be serialized.
    pub fn into_payload(result: Result<Message>) -> Result<Payload> {
        let (reply, transfer) = match result {
            Ok(mut message) => {
                let transfer = message.transfer.take().unwrap_or_default();
                let reply = Self {
                    ok: true,
                    message: Some(message),
                    error: None,
                };
                (reply, transfer)
            }
            Err(e) => {
                let reply = Self {
                    ok: false,
                    message: None,
                    error: Some(e.relay_reason()),
                };
                (reply, Vec::new())
            }
        };

        Ok(Payload::new(serde_json::to_value(reply)?).with_transfer(transfer))
    }

    /// Parses a fetch reply payload back into the stored message for `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::FetchFailed`] if the reply reports failure
    /// - [`Error::Protocol`] if the reply is malformed
    pub fn from_payload(id: MessageId, payload: Payload) -> Result<Message> {
        let reply: Self = serde_json::from_value(payload.data)
            .map_err(|e| Error::protocol(format!("malformed fetch reply: {e}")))?;

        if !reply.ok {
            let reason = reply.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(Error::fetch_failed(id, reason));
        }

        let mut message = reply
            .message
            .ok_or_else(|| Error::protocol("fetch reply without message"))?;
        if !payload.transfer.is_empty() {
            message.transfer = Some(payload.transfer);
        }
        Ok(message)
    }
}

// ============================================================================
// Store Request Helpers
// ============================================================================

/// Builds the payload of a store request for `message`.
///
/// # Errors
///
/// Returns [`Error::Json`] if the message cannot be serialized.
pub fn store_request_payload(message: Message) -> Result<Payload> {
    let (data, transfer) = message.into_wire()?;
    Ok(Payload::new(data).with_transfer(transfer))
}

/// Recovers the message carried by a store request.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the payload is not a protocol message.
pub fn message_from_store_request(payload: Payload) -> Result<Message> {
    Message::from_wire(&payload.data, payload.transfer)
        .ok_or_else(|| Error::protocol("store request does not carry a message"))
}

/// Recovers the id carried by a fetch request.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the payload is not a message id.
pub fn id_from_fetch_request(data: Value) -> Result<MessageId> {
    serde_json::from_value(data).map_err(|e| Error::protocol(format!("malformed fetch request: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
