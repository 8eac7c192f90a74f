//! Fan-out inbox for one listening side.
//!
//! A [`Mailbox`] behaves like a host event target restricted to message
//! events: every [`Listener`] obtained from it receives its own copy of each
//! [`Delivery`], and dropping the listener removes it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::Transferable;

// ============================================================================
// Delivery
// ============================================================================

/// One inbound message event.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Wire data.
    pub data: Value,
    /// Resources moved with the data.
    pub transfer: Vec<Transferable>,
    /// Where a reply to this delivery should go, if the transport knows.
    pub source: Option<Mailbox>,
    /// Origin of the sender, if the transport reports one.
    pub origin: Option<String>,
}

// ============================================================================
// Mailbox
// ============================================================================

/// Shared inbox that fans each delivery out to all current listeners.
#[derive(Clone)]
pub struct Mailbox {
    inner: Arc<MailboxInner>,
}

struct MailboxInner {
    /// Origin reported on deliveries sent from this mailbox's owner.
    origin: Option<String>,
    /// Active listeners by key.
    listeners: Mutex<FxHashMap<u64, mpsc::UnboundedSender<Delivery>>>,
    /// Next listener key.
    next_key: AtomicU64,
}

impl Mailbox {
    /// Creates a mailbox without an origin.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a mailbox whose owner lives at `origin`.
    #[must_use]
    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self::build(Some(origin.into()))
    }

    fn build(origin: Option<String>) -> Self {
        Self {
            inner: Arc::new(MailboxInner {
                origin,
                listeners: Mutex::new(FxHashMap::default()),
                next_key: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the owner's origin.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.inner.origin.as_deref()
    }

    /// Registers a new listener.
    #[must_use]
    pub fn listen(&self) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(key, tx);

        Listener {
            rx,
            key,
            mailbox: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers to every current listener.
    ///
    /// Returns how many listeners received the delivery.
    pub fn deliver(&self, delivery: Delivery) -> usize {
        let mut listeners = self.inner.listeners.lock();
        listeners.retain(|_, tx| !tx.is_closed());

        for tx in listeners.values() {
            let _ = tx.send(delivery.clone());
        }

        trace!(listeners = listeners.len(), "Delivery dispatched");
        listeners.len()
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Returns `true` if both handles refer to the same mailbox.
    #[inline]
    #[must_use]
    pub fn same_mailbox(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("origin", &self.inner.origin)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Receiving handle registered on a [`Mailbox`].
///
/// Deregisters itself on drop.
pub struct Listener {
    rx: mpsc::UnboundedReceiver<Delivery>,
    key: u64,
    mailbox: Weak<MailboxInner>,
}

impl Listener {
    /// Waits for the next delivery.
    ///
    /// Returns `None` once the mailbox is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Returns the next delivery if one is already queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(inner) = self.mailbox.upgrade() {
            inner.listeners.lock().remove(&self.key);
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("key", &self.key).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
