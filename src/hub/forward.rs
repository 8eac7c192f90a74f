//! Forwarding store/fetch to another context's hub.

// ============================================================================
// Imports
// ============================================================================

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::messenger::Messenger;
use crate::protocol::hub::store_request_payload;
use crate::protocol::{FETCH_MESSAGE_TYPE, FetchReply, Message, STORE_MESSAGE_TYPE, StoreReply};
use crate::transport::EndpointRef;

use super::core::Hub;
use super::strategy::HubStrategy;

// ============================================================================
// ForwardTarget
// ============================================================================

/// Store/fetch issued as requests to a hub reachable over one endpoint.
#[derive(Debug)]
pub struct ForwardTarget {
    messenger: Messenger,
    timeout: Duration,
}

impl ForwardTarget {
    /// Creates a target over `endpoint` with a per-request budget.
    #[must_use]
    pub fn new(endpoint: EndpointRef, timeout: Duration) -> Self {
        Self {
            messenger: Messenger::new(endpoint),
            timeout,
        }
    }

    /// Stores `message` in the remote hub.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreFailed`] naming the message id.
    pub async fn store(&self, message: Message) -> Result<()> {
        let id = message.id;
        let payload = store_request_payload(message)?;

        let reply = self
            .messenger
            .request_with_timeout(STORE_MESSAGE_TYPE, payload.data, Some(payload.transfer), self.timeout)
            .await
            .map_err(|e| e.into_store_failed(id))?;

        let reply: StoreReply = serde_json::from_value(reply.data)
            .map_err(|e| Error::store_failed(id, format!("malformed store reply: {e}")))?;
        reply.into_result(id)
    }

    /// Fetches the message stored under `id` from the remote hub.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FetchFailed`] naming the message id.
    pub async fn fetch(&self, id: MessageId) -> Result<Message> {
        let reply = self
            .messenger
            .request_with_timeout(FETCH_MESSAGE_TYPE, serde_json::to_value(id)?, None, self.timeout)
            .await
            .map_err(|e| e.into_fetch_failed(id))?;

        FetchReply::from_payload(id, reply).map_err(|e| e.into_fetch_failed(id))
    }
}

// ============================================================================
// PassThroughStrategy
// ============================================================================

/// Dedicated-worker strategy: everything goes to the parent context.
#[derive(Debug, Default)]
pub struct PassThroughStrategy {
    target: OnceLock<ForwardTarget>,
}

impl PassThroughStrategy {
    /// Creates an unbound strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bound(&self) -> Result<&ForwardTarget> {
        self.target
            .get()
            .ok_or_else(|| Error::protocol("pass-through hub used before bootstrap"))
    }
}

#[async_trait]
impl HubStrategy for PassThroughStrategy {
    fn name(&self) -> &'static str {
        "pass-through"
    }

    async fn bootstrap(&self, hub: &Hub) -> Result<()> {
        let parent = hub
            .host()
            .scope()
            .ok_or_else(|| Error::missing_endpoint("worker parent"))?;

        if self.target.get().is_none() {
            let _ = self
                .target
                .set(ForwardTarget::new(parent, hub.options().request_timeout));
            debug!("Worker hub forwarding to parent");
        }
        Ok(())
    }

    async fn store(&self, message: Message) -> Result<()> {
        self.bound()?.store(message).await
    }

    async fn fetch(&self, id: MessageId) -> Result<Message> {
        self.bound()?.fetch(id).await
    }
}

// ============================================================================
// Tests
// ============================================================================
