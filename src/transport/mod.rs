//! Endpoint abstraction and in-memory transport.
//!
//! The messenger consumes endpoints through the [`Endpoint`] trait only.
//! Concrete host adapters live outside this crate; the in-memory adapters
//! here provide reliable in-process delivery for embedding and tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   post(data, transfer, reply_to)   ┌──────────────┐
//! │  Endpoint A  │ ─────────────────────────────────► │  Mailbox B   │
//! │  (local: A)  │                                    │  ├ Listener  │
//! │              │ ◄───────────────────────────────── │  └ Listener  │
//! └──────────────┘   Delivery { source: A, origin }   └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `endpoint` | [`Endpoint`] trait and [`EndpointKind`] |
//! | `mailbox` | [`Mailbox`], [`Listener`], [`Delivery`] |
//! | `memory` | Port, server and broadcast adapters |

// ============================================================================
// Submodules
// ============================================================================

/// Endpoint capability contract.
pub mod endpoint;

/// Fan-out inbox.
pub mod mailbox;

/// In-memory endpoint adapters.
pub mod memory;

// ============================================================================
// Re-exports
// ============================================================================

pub use endpoint::{Endpoint, EndpointKind, EndpointRef};
pub use mailbox::{Delivery, Listener, Mailbox};
pub use memory::{BroadcastChannel, BroadcastEndpoint, PortEndpoint, ServerEndpoint};
