//! Send/inject hooks used by the messenger.
//!
//! A [`Courier`] performs the one-way transmission of a message and
//! prepares every inbound message before it reaches matching logic or a
//! responder. The default methods post directly and leave messages as they
//! arrived.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Message;
use crate::transport::{Endpoint, Mailbox};

// ============================================================================
// Courier
// ============================================================================

/// Transmission strategy of a messenger.
#[async_trait]
pub trait Courier: Send + Sync {
    /// Transmits `message` over `endpoint`.
    ///
    /// `reply_to` is the source of the delivery being answered, if any.
    ///
    /// # Errors
    ///
    /// Whatever the endpoint or the relay reports.
    async fn send(&self, endpoint: &dyn Endpoint, message: Message, reply_to: Option<&Mailbox>) -> Result<()> {
        let (data, transfer) = message.into_wire()?;
        endpoint.post(data, transfer, reply_to)
    }

    /// Prepares an inbound request or response in place.
    ///
    /// # Errors
    ///
    /// An error aborts processing of this message.
    async fn inject(&self, _message: &mut Message) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// DirectCourier
// ============================================================================

/// Courier for transports that carry transferables themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectCourier;

#[async_trait]
impl Courier for DirectCourier {}
