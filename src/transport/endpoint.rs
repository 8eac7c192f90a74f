//! Endpoint capability contract.
//!
//! An [`Endpoint`] is the pair of capabilities every context-specific adapter
//! provides: listening for inbound deliveries and posting data, optionally
//! with transferables and optionally to a recovered reply-to target.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::identifiers::EndpointId;
use crate::protocol::Transferable;

use super::mailbox::{Listener, Mailbox};

// ============================================================================
// EndpointKind
// ============================================================================

/// Shape of the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Point-to-point channel with a fixed peer (port, window).
    Port,
    /// Handle to a dedicated worker spawned by this context.
    ///
    /// The worker's hub forwards to its parent over this channel, so the
    /// parent onboards it when it builds a messenger over it.
    Worker,
    /// Listening scope with no fixed peer; can only reply to senders.
    Server,
    /// Named channel delivering to every other member.
    Broadcast,
}

impl EndpointKind {
    /// Returns `true` if the transport can move transferable resources.
    #[inline]
    #[must_use]
    pub const fn supports_transfer(self) -> bool {
        !matches!(self, Self::Broadcast)
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Port => "port",
            Self::Worker => "worker",
            Self::Server => "server",
            Self::Broadcast => "broadcast",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Listen/post capability pair supplied by the environment.
pub trait Endpoint: Send + Sync + fmt::Debug {
    /// Identity of this endpoint.
    fn id(&self) -> EndpointId;

    /// Transport shape.
    fn kind(&self) -> EndpointKind;

    /// Registers a listener for inbound deliveries.
    fn listen(&self) -> Listener;

    /// Posts `data` with `transfer`.
    ///
    /// `reply_to` is the source recovered from an inbound delivery; when
    /// present it overrides the statically configured peer.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::NoDestination`] if there is neither a peer nor a reply target
    /// - [`crate::Error::TransferUnsupported`] if the transport cannot move `transfer`
    fn post(&self, data: Value, transfer: Vec<Transferable>, reply_to: Option<&Mailbox>) -> Result<()>;

    /// Returns `true` if transferables can be posted directly.
    fn supports_transfer(&self) -> bool {
        self.kind().supports_transfer()
    }
}

/// Shared endpoint handle.
pub type EndpointRef = Arc<dyn Endpoint>;

// ============================================================================
// Tests
// ============================================================================
