//! Relay-aware courier for transports that cannot move transferables.
//!
//! Outbound messages with a transfer list are parked in the hub and only
//! their metadata is posted. Inbound metadata-only messages get their
//! payload and transfer list fetched back from the hub before anything else
//! sees them.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::error::Result;
use crate::hub::Hub;
use crate::protocol::Message;
use crate::transport::{Endpoint, Mailbox};

use super::courier::Courier;

// ============================================================================
// RelayCourier
// ============================================================================

/// Courier that relays payloads with transferables through a [`Hub`].
#[derive(Debug, Clone)]
pub struct RelayCourier {
    hub: Arc<Hub>,
}

impl RelayCourier {
    /// Creates a courier relaying through `hub`.
    #[must_use]
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Returns the hub payloads are parked in.
    #[inline]
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }
}

#[async_trait]
impl Courier for RelayCourier {
    async fn send(&self, endpoint: &dyn Endpoint, message: Message, reply_to: Option<&Mailbox>) -> Result<()> {
        if !message.carries_transfer() {
            let (data, transfer) = message.into_wire()?;
            return endpoint.post(data, transfer, reply_to);
        }

        let id = message.id;
        let metadata = message.metadata();
        self.hub
            .store(message)
            .await
            .map_err(|e| e.into_store_failed(id))?;
        trace!(%id, "Payload parked in hub");

        let (data, transfer) = metadata.into_wire()?;
        endpoint.post(data, transfer, reply_to)
    }

    async fn inject(&self, message: &mut Message) -> Result<()> {
        if !message.is_metadata_only() {
            return Ok(());
        }

        let id = message.id;
        let stored = self
            .hub
            .fetch(id)
            .await
            .map_err(|e| e.into_fetch_failed(id))?;
        trace!(%id, "Payload collected from hub");

        message.payload = stored.payload;
        message.transfer = stored.transfer;
        Ok(())
    }
}
