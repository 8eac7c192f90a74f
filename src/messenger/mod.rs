//! Request/response messaging.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Messenger`] correlator and dispatch loop |
//! | `courier` | [`Courier`] send/inject strategy, [`DirectCourier`] |
//! | `relay` | [`RelayCourier`] parking payloads in the hub |
//! | `responder` | [`Responder`] handlers |

// ============================================================================
// Submodules
// ============================================================================

/// Correlator and dispatch loop.
pub mod core;

/// Send/inject strategy.
pub mod courier;

/// Hub-backed courier.
pub mod relay;

/// Responder handlers.
pub mod responder;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{DEFAULT_REQUEST_TIMEOUT, Messenger};
pub use courier::{Courier, DirectCourier};
pub use relay::RelayCourier;
pub use responder::{HandlerFuture, Responder};
