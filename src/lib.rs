//! Post Relay - request/response messaging between execution contexts.
//!
//! This library layers request/response semantics over one-way,
//! postMessage-style transports, and relays payloads with transferable
//! resources through a per-context hub when the transport cannot move them.
//!
//! # Architecture
//!
//! - **Messenger**: correlates requests and responses over one endpoint,
//!   and runs standing responders for inbound requests
//! - **Hub**: one per context; parks messages by id so a receiver on a
//!   transferable-less transport (a broadcast channel) can fetch them
//! - **Storage relay**: the only context that actually stores; every other
//!   hub forwards to it, discovering it on first use
//!
//! Key design principles:
//!
//! - A response reuses its request's id and type; nothing else resolves it
//! - Foreign traffic on a shared transport is ignored, never an error
//! - Every failure reaches the caller as a named [`Error`]
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use post_relay::{Messenger, Payload, PortEndpoint, Responder, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (a, b) = PortEndpoint::pair();
//!
//!     let server = Messenger::new(Arc::new(b));
//!     let echo = Responder::new(|payload: Payload| async move { Ok(payload) });
//!     server.response("echo", &echo)?;
//!
//!     let client = Messenger::new(Arc::new(a));
//!     let reply = client.request("echo", json!({"greeting": "hi"}), None).await?;
//!     assert_eq!(reply.data["greeting"], "hi");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | [`ExecutionContext`], [`ContextKind`], [`Host`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`hub`] | [`Hub`], strategies and [`HubOptions`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`messenger`] | [`Messenger`], [`Responder`], couriers |
//! | [`protocol`] | Message wire types |
//! | [`transport`] | [`Endpoint`] abstraction and in-memory adapters |

// ============================================================================
// Modules
// ============================================================================

/// Execution contexts and host capabilities.
pub mod context;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Per-context message hub.
pub mod hub;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Request/response messaging.
pub mod messenger;

/// Protocol message types.
pub mod protocol;

/// Endpoint abstraction and in-memory transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Context types
pub use context::{ContextKind, ExecutionContext, Host};

// Error types
pub use error::{Error, Result};

// Hub types
pub use hub::{BootstrapState, Hub, HubOptions, HubState, HubStrategy};

// Identifier types
pub use identifiers::{ContextId, EndpointId, MessageId, ResponderId};

// Messenger types
pub use messenger::{Courier, DEFAULT_REQUEST_TIMEOUT, DirectCourier, Messenger, RelayCourier, Responder};

// Protocol types
pub use protocol::{Message, MessageKind, Payload, Transferable};

// Transport types
pub use transport::{
    BroadcastChannel, BroadcastEndpoint, Delivery, Endpoint, EndpointKind, EndpointRef, Listener,
    Mailbox, PortEndpoint, ServerEndpoint,
};
