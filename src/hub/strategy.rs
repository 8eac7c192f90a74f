//! Context-specific hub behaviour.
//!
//! | Context | Strategy | Store/fetch |
//! |---------|----------|-------------|
//! | Storage | [`StorageStrategy`] | in-memory map |
//! | Worker | [`PassThroughStrategy`] | forwarded to the parent |
//! | Page | [`DiscoveryStrategy`] | forwarded to the located storage relay |
//! | Worklet | none | construction fails |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ContextKind;
use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::Message;

use super::core::Hub;
use super::discovery::DiscoveryStrategy;
use super::forward::PassThroughStrategy;
use super::options::HubOptions;
use super::state::BootstrapState;
use super::storage::StorageStrategy;

// ============================================================================
// HubStrategy
// ============================================================================

/// Bootstrap plus store/fetch for one kind of context.
#[async_trait]
pub trait HubStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Binds the strategy to its storage and onboards the context's scope.
    ///
    /// # Errors
    ///
    /// Any failure leaves the hub off.
    async fn bootstrap(&self, hub: &Hub) -> Result<()>;

    /// Parks `message` under its id.
    async fn store(&self, message: Message) -> Result<()>;

    /// Removes and returns the message stored under `id`.
    async fn fetch(&self, id: MessageId) -> Result<Message>;

    /// Topology discovery progress, for strategies that discover.
    fn bootstrap_state(&self) -> Option<BootstrapState> {
        None
    }
}

/// Builds the strategy for a context kind.
///
/// # Errors
///
/// Returns [`Error::UnsupportedContext`] for worklets.
pub fn for_kind(kind: ContextKind, options: &HubOptions) -> Result<Arc<dyn HubStrategy>> {
    match kind {
        ContextKind::Storage => Ok(Arc::new(StorageStrategy::new(
            options.entry_ttl,
            options.max_entries,
        ))),
        ContextKind::Worker => Ok(Arc::new(PassThroughStrategy::new())),
        ContextKind::Page => Ok(Arc::new(DiscoveryStrategy::new())),
        ContextKind::Worklet => Err(Error::unsupported_context(kind)),
    }
}

// ============================================================================
// Tests
// ============================================================================
