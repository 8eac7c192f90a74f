//! Standing responders and their registration table.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::identifiers::ResponderId;
use crate::protocol::Payload;

// ============================================================================
// Types
// ============================================================================

/// Boxed future returned by a responder handler.
pub type HandlerFuture = BoxFuture<'static, Result<Payload>>;

/// Type-erased handler.
type HandlerFn = dyn Fn(Payload) -> HandlerFuture + Send + Sync;

// ============================================================================
// Responder
// ============================================================================

/// Async handler answering every inbound request of a type.
///
/// Clones share identity: registering a clone of an attached responder is a
/// duplicate, and either clone can be used to deregister.
///
/// # Example
///
/// ```ignore
/// let echo = Responder::new(|payload: Payload| async move { Ok(payload) });
/// messenger.response("echo", &echo)?;
/// ```
#[derive(Clone)]
pub struct Responder {
    handler: Arc<HandlerFn>,
}

impl Responder {
    /// Wraps an async handler.
    ///
    /// The handler may return anything convertible into a [`Payload`]: a bare
    /// JSON value, or a payload with a transfer list. An `Err` is sent back
    /// to the requester as a failed response.
    pub fn new<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Into<Payload>,
    {
        let handler: Arc<HandlerFn> = Arc::new(move |payload| {
            let reply = handler(payload);
            async move { reply.await.map(Into::into) }.boxed()
        });
        Self { handler }
    }

    /// Returns this responder's identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ResponderId {
        ResponderId::from_addr(Arc::as_ptr(&self.handler).cast::<()>() as usize)
    }

    /// Invokes the handler.
    pub(crate) fn call(&self, payload: Payload) -> HandlerFuture {
        (self.handler)(payload)
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder").field("id", &self.id()).finish()
    }
}

// ============================================================================
// ResponderTable
// ============================================================================

/// Registration table: responder identity -> (type, responder).
///
/// Owned by one messenger; entries are reclaimed on deregistration.
#[derive(Debug, Default)]
pub(crate) struct ResponderTable {
    entries: FxHashMap<ResponderId, Registration>,
}

#[derive(Debug)]
struct Registration {
    message_type: String,
    responder: Responder,
}

impl ResponderTable {
    /// Registers `responder` for `message_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateResponder`] if the responder is already registered.
    pub fn insert(&mut self, message_type: String, responder: &Responder) -> Result<()> {
        let id = responder.id();
        if self.entries.contains_key(&id) {
            return Err(Error::duplicate_responder(message_type));
        }

        self.entries.insert(
            id,
            Registration {
                message_type,
                responder: responder.clone(),
            },
        );
        Ok(())
    }

    /// Removes one responder, or all of them when `responder` is `None`.
    ///
    /// Returns how many registrations were removed.
    pub fn remove(&mut self, responder: Option<&Responder>) -> usize {
        match responder {
            Some(responder) => usize::from(self.entries.remove(&responder.id()).is_some()),
            None => {
                let count = self.entries.len();
                self.entries.clear();
                count
            }
        }
    }

    /// Returns the responders registered for `message_type`.
    pub fn matching(&self, message_type: &str) -> Vec<Responder> {
        self.entries
            .values()
            .filter(|r| r.message_type == message_type)
            .map(|r| r.responder.clone())
            .collect()
    }

    /// Returns the number of registrations.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
