//! In-memory endpoint adapters.
//!
//! Reliable in-process stand-ins for host transports:
//!
//! | Adapter | Kind | Peer | Transfers |
//! |---------|------|------|-----------|
//! | [`PortEndpoint`] | Port or Worker | fixed remote mailbox | yes |
//! | [`ServerEndpoint`] | Server | reply-to only | yes |
//! | [`BroadcastEndpoint`] | Broadcast | every other member | no |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::EndpointId;
use crate::protocol::Transferable;

use super::endpoint::{Endpoint, EndpointKind};
use super::mailbox::{Delivery, Listener, Mailbox};

// ============================================================================
// PortEndpoint
// ============================================================================

/// Point-to-point endpoint: listens on `local`, posts to `remote`.
#[derive(Debug)]
pub struct PortEndpoint {
    id: EndpointId,
    kind: EndpointKind,
    local: Mailbox,
    remote: Mailbox,
}

impl PortEndpoint {
    /// Creates an endpoint over existing mailboxes.
    #[must_use]
    pub fn new(local: Mailbox, remote: Mailbox) -> Self {
        Self {
            id: EndpointId::next(),
            kind: EndpointKind::Port,
            local,
            remote,
        }
    }

    /// Creates the parent's handle to a dedicated worker.
    #[must_use]
    pub fn worker(local: Mailbox, remote: Mailbox) -> Self {
        Self {
            kind: EndpointKind::Worker,
            ..Self::new(local, remote)
        }
    }

    /// Creates two connected endpoints over fresh mailboxes.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let a = Mailbox::new();
        let b = Mailbox::new();
        (Self::new(a.clone(), b.clone()), Self::new(b, a))
    }

    /// Creates a parent-side worker handle and the worker's own scope.
    #[must_use]
    pub fn worker_pair() -> (Self, Self) {
        let parent = Mailbox::new();
        let worker = Mailbox::new();
        (Self::worker(parent.clone(), worker.clone()), Self::new(worker, parent))
    }

    /// Returns the listening mailbox.
    #[inline]
    #[must_use]
    pub fn local(&self) -> &Mailbox {
        &self.local
    }

    /// Returns the peer mailbox.
    #[inline]
    #[must_use]
    pub fn remote(&self) -> &Mailbox {
        &self.remote
    }
}

impl Endpoint for PortEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn kind(&self) -> EndpointKind {
        self.kind
    }

    fn listen(&self) -> Listener {
        self.local.listen()
    }

    fn post(&self, data: Value, transfer: Vec<Transferable>, reply_to: Option<&Mailbox>) -> Result<()> {
        let target = reply_to.unwrap_or(&self.remote);
        target.deliver(Delivery {
            data,
            transfer,
            source: Some(self.local.clone()),
            origin: self.local.origin().map(str::to_string),
        });
        Ok(())
    }
}

// ============================================================================
// ServerEndpoint
// ============================================================================

/// Listening scope without a fixed peer.
///
/// Models a context such as a storage worker that can only answer whoever
/// asked.
#[derive(Debug)]
pub struct ServerEndpoint {
    id: EndpointId,
    local: Mailbox,
}

impl ServerEndpoint {
    /// Creates a server endpoint over `local`.
    #[must_use]
    pub fn new(local: Mailbox) -> Self {
        Self {
            id: EndpointId::next(),
            local,
        }
    }

    /// Returns the listening mailbox.
    #[inline]
    #[must_use]
    pub fn local(&self) -> &Mailbox {
        &self.local
    }
}

impl Endpoint for ServerEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Server
    }

    fn listen(&self) -> Listener {
        self.local.listen()
    }

    fn post(&self, data: Value, transfer: Vec<Transferable>, reply_to: Option<&Mailbox>) -> Result<()> {
        let target = reply_to.ok_or(Error::NoDestination {
            kind: EndpointKind::Server,
        })?;
        target.deliver(Delivery {
            data,
            transfer,
            source: Some(self.local.clone()),
            origin: self.local.origin().map(str::to_string),
        });
        Ok(())
    }
}

// ============================================================================
// BroadcastChannel
// ============================================================================

/// Named channel joined by any number of members.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    name: String,
    members: Arc<Mutex<FxHashMap<EndpointId, Mailbox>>>,
}

impl BroadcastChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Arc::new(Mutex::new(FxHashMap::default())),
        }
    }

    /// Returns the channel name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Joins the channel with a fresh member endpoint.
    #[must_use]
    pub fn join(&self) -> BroadcastEndpoint {
        let id = EndpointId::next();
        let local = Mailbox::new();
        self.members.lock().insert(id, local.clone());

        BroadcastEndpoint {
            id,
            local,
            channel: self.clone(),
        }
    }

    /// Returns the number of members.
    #[inline]
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }
}

// ============================================================================
// BroadcastEndpoint
// ============================================================================

/// Membership in a [`BroadcastChannel`].
///
/// Posts reach every other member; the sender never hears itself. Leaves the
/// channel on drop.
#[derive(Debug)]
pub struct BroadcastEndpoint {
    id: EndpointId,
    local: Mailbox,
    channel: BroadcastChannel,
}

impl Endpoint for BroadcastEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Broadcast
    }

    fn listen(&self) -> Listener {
        self.local.listen()
    }

    fn post(&self, data: Value, transfer: Vec<Transferable>, _reply_to: Option<&Mailbox>) -> Result<()> {
        if !transfer.is_empty() {
            return Err(Error::TransferUnsupported {
                kind: EndpointKind::Broadcast,
            });
        }

        let targets: Vec<Mailbox> = self
            .channel
            .members
            .lock()
            .iter()
            .filter(|(id, _)| **id != self.id)
            .map(|(_, mailbox)| mailbox.clone())
            .collect();

        trace!(channel = %self.channel.name, targets = targets.len(), "Broadcast post");

        for target in targets {
            target.deliver(Delivery {
                data: data.clone(),
                transfer: Vec::new(),
                source: None,
                origin: None,
            });
        }
        Ok(())
    }
}

impl Drop for BroadcastEndpoint {
    fn drop(&mut self) {
        self.channel.members.lock().remove(&self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================
