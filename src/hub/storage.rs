//! Storage-relay strategy: the authoritative message store.
//!
//! Entries are consumed by their first fetch. Expired entries are purged
//! when the next message is stored, and a full map refuses new entries.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::Message;

use super::core::Hub;
use super::strategy::HubStrategy;

// ============================================================================
// StorageStrategy
// ============================================================================

/// In-memory store keyed by message id.
#[derive(Debug)]
pub struct StorageStrategy {
    entries: Mutex<FxHashMap<MessageId, StoredEntry>>,
    ttl: Option<Duration>,
    max_entries: usize,
}

#[derive(Debug)]
struct StoredEntry {
    message: Message,
    stored_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.duration_since(self.stored_at) >= ttl)
    }
}

impl StorageStrategy {
    /// Creates an empty store.
    #[must_use]
    pub fn new(ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            ttl,
            max_entries,
        }
    }

    /// Returns the number of stored messages, expired ones included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn insert(&self, message: Message) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if self.ttl.is_some() {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(self.ttl, now));
            let purged = before - entries.len();
            if purged > 0 {
                debug!(purged, "Expired messages purged");
            }
        }

        if !entries.contains_key(&message.id) && entries.len() >= self.max_entries {
            return Err(Error::StorageFull {
                capacity: self.max_entries,
            });
        }

        trace!(id = %message.id, "Message stored");
        entries.insert(
            message.id,
            StoredEntry {
                message,
                stored_at: now,
            },
        );
        Ok(())
    }

    fn take(&self, id: MessageId) -> Result<Message> {
        let entry = self
            .entries
            .lock()
            .remove(&id)
            .ok_or_else(|| Error::message_not_found(id))?;

        if entry.is_expired(self.ttl, Instant::now()) {
            trace!(%id, "Stored message expired");
            return Err(Error::message_not_found(id));
        }

        trace!(%id, "Message fetched");
        Ok(entry.message)
    }
}

#[async_trait]
impl HubStrategy for StorageStrategy {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn bootstrap(&self, hub: &Hub) -> Result<()> {
        let scope = hub
            .host()
            .scope()
            .ok_or_else(|| Error::missing_endpoint("storage relay scope"))?;
        hub.attach_listener(scope)
    }

    async fn store(&self, message: Message) -> Result<()> {
        self.insert(message)
    }

    async fn fetch(&self, id: MessageId) -> Result<Message> {
        self.take(id)
    }
}

// ============================================================================
// Tests
// ============================================================================
