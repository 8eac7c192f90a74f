//! Error types for post-relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use post_relay::{Messenger, Result};
//!
//! async fn example(messenger: &Messenger) -> Result<()> {
//!     let reply = messenger.request("echo", serde_json::json!("hi"), None).await?;
//!     println!("{}", reply.data);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Construction | [`Error::UnsupportedContext`], [`Error::MissingEndpoint`], [`Error::TransferUnsupported`], [`Error::NoDestination`], [`Error::Config`] |
//! | Protocol | [`Error::DuplicateResponder`], [`Error::Protocol`], [`Error::Remote`] |
//! | Transient | [`Error::RequestTimeout`], [`Error::StoreFailed`], [`Error::FetchFailed`], [`Error::MessageNotFound`], [`Error::StorageFull`] |
//! | Hub | [`Error::HubRebound`], [`Error::Bootstrap`], [`Error::BootstrapTimeout`], [`Error::ReloadScheduled`] |
//! | External | [`Error::Json`], [`Error::Url`], [`Error::ChannelClosed`], [`Error::Disconnected`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::context::ContextKind;
use crate::identifiers::MessageId;
use crate::transport::EndpointKind;

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
    // Construction Errors
    // ========================================================================
    /// A hub cannot exist in this kind of execution context.
    #[error("Cannot create a hub in a {kind} context")]
    UnsupportedContext {
        /// The offending context kind.
        kind: ContextKind,
    },

    /// The host did not provide an endpoint the operation needs.
    #[error("Missing endpoint: {role}")]
    MissingEndpoint {
        /// What the endpoint was needed for.
        role: String,
    },

    /// The endpoint cannot carry transferable resources.
    #[error("{kind} endpoint cannot carry transferable resources")]
    TransferUnsupported {
        /// Kind of the endpoint.
        kind: EndpointKind,
    },

    /// Nothing to send to: no static peer and no sender to reply to.
    #[error("No destination: {kind} endpoint can only reply to a sender")]
    NoDestination {
        /// Kind of the endpoint.
        kind: EndpointKind,
    },

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The same responder handler is already registered.
    #[error("Responder already attached (registering for type {message_type})")]
    DuplicateResponder {
        /// Type the second registration asked for.
        message_type: String,
    },

    /// Malformed or unexpected protocol data.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },

    /// The remote responder's handler failed.
    #[error("Remote handler for {message_type} failed: {message}")]
    Remote {
        /// Type of the failed request.
        message_type: String,
        /// Error text reported by the remote side.
        message: String,
    },

    // ========================================================================
    // Transient Errors
    // ========================================================================
    /// No response arrived within the request budget.
    #[error("Request {id} ({message_type}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request id that timed out.
        id: MessageId,
        /// The request type.
        message_type: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Storing a message in the hub failed.
    #[error("Hub store failed for {id}: {reason}")]
    StoreFailed {
        /// Id of the message being stored.
        id: MessageId,
        /// Why the store failed.
        reason: String,
    },

    /// Fetching a message from the hub failed.
    #[error("Hub fetch failed for {id}: {reason}")]
    FetchFailed {
        /// Id of the message being fetched.
        id: MessageId,
        /// Why the fetch failed.
        reason: String,
    },

    /// No stored message with this id (never stored, expired, or already fetched).
    #[error("Message not found: {id}")]
    MessageNotFound {
        /// The missing id.
        id: MessageId,
    },

    /// The storage map reached its entry cap.
    #[error("Hub storage full ({capacity} entries)")]
    StorageFull {
        /// Configured capacity.
        capacity: usize,
    },

    // ========================================================================
    // Hub Errors
    // ========================================================================
    /// The hub was rebound while this operation waited on it.
    #[error("Hub was rebound during initialization")]
    HubRebound,

    /// Another caller's bootstrap of the same hub failed.
    #[error("Hub bootstrap failed: {message}")]
    Bootstrap {
        /// Failure reported by the bootstrapping caller.
        message: String,
    },

    /// The secondary relay page never signalled readiness.
    #[error("Relay page not ready after {attempts} attempt(s) of {timeout_ms}ms")]
    BootstrapTimeout {
        /// Attempts made.
        attempts: u32,
        /// Milliseconds waited per attempt.
        timeout_ms: u64,
    },

    /// The context is being reloaded to pick up its storage relay.
    #[error("Context reload scheduled after {delay_ms}ms: storage relay not controlling yet")]
    ReloadScheduled {
        /// Backoff before the reload.
        delay_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A pending request's reply channel closed without an answer.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),

    /// The messenger or mailbox went away.
    #[error("Disconnected")]
    Disconnected,
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an unsupported context error.
    #[inline]
    pub fn unsupported_context(kind: ContextKind) -> Self {
        Self::UnsupportedContext { kind }
    }

    /// Creates a missing endpoint error.
    #[inline]
    pub fn missing_endpoint(role: impl Into<String>) -> Self {
        Self::MissingEndpoint { role: role.into() }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a duplicate responder error.
    #[inline]
    pub fn duplicate_responder(message_type: impl Into<String>) -> Self {
        Self::DuplicateResponder {
            message_type: message_type.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a remote handler error.
    #[inline]
    pub fn remote(message_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            message_type: message_type.into(),
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: MessageId, message_type: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            id,
            message_type: message_type.into(),
            timeout_ms,
        }
    }

    /// Creates a store failed error.
    #[inline]
    pub fn store_failed(id: MessageId, reason: impl Into<String>) -> Self {
        Self::StoreFailed {
            id,
            reason: reason.into(),
        }
    }

    /// Creates a fetch failed error.
    #[inline]
    pub fn fetch_failed(id: MessageId, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            id,
            reason: reason.into(),
        }
    }

    /// Creates a message not found error.
    #[inline]
    pub fn message_not_found(id: MessageId) -> Self {
        Self::MessageNotFound { id }
    }

    /// Creates a bootstrap failure error.
    #[inline]
    pub fn bootstrap(message: impl Into<String>) -> Self {
        Self::Bootstrap {
            message: message.into(),
        }
    }

    /// Creates a bootstrap timeout error.
    #[inline]
    pub fn bootstrap_timeout(attempts: u32, timeout_ms: u64) -> Self {
        Self::BootstrapTimeout {
            attempts,
            timeout_ms,
        }
    }

    /// Creates a reload scheduled error.
    #[inline]
    pub fn reload_scheduled(delay_ms: u64) -> Self {
        Self::ReloadScheduled { delay_ms }
    }
}

// ============================================================================
// Error Conversions
// ============================================================================

impl Error {
    /// Names this error as a failed store of `id`.
    ///
    /// Already-named store failures pass through unchanged.
    #[must_use]
    pub fn into_store_failed(self, id: MessageId) -> Self {
        match self {
            err @ Self::StoreFailed { .. } => err,
            other => Self::store_failed(id, other.to_string()),
        }
    }

    /// Names this error as a failed fetch of `id`.
    ///
    /// Already-named fetch failures pass through unchanged.
    #[must_use]
    pub fn into_fetch_failed(self, id: MessageId) -> Self {
        match self {
            err @ Self::FetchFailed { .. } => err,
            other => Self::fetch_failed(id, other.to_string()),
        }
    }
}

impl Error {
    /// Returns the reason to report across a store/fetch hop.
    ///
    /// Named relay failures give their inner reason so the receiving side
    /// names the failure exactly once.
    #[must_use]
    pub fn relay_reason(&self) -> String {
        match self {
            Self::StoreFailed { reason, .. } | Self::FetchFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::BootstrapTimeout { .. }
        )
    }

    /// Returns `true` if this error comes from the store/fetch relay.
    #[inline]
    #[must_use]
    pub fn is_relay_error(&self) -> bool {
        matches!(
            self,
            Self::StoreFailed { .. }
                | Self::FetchFailed { .. }
                | Self::MessageNotFound { .. }
                | Self::StorageFull { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry. This layer never retries
    /// on its own.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. }
                | Self::BootstrapTimeout { .. }
                | Self::ReloadScheduled { .. }
                | Self::HubRebound
                | Self::Bootstrap { .. }
                | Self::StorageFull { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
