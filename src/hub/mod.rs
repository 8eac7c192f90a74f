//! Per-context message hub.
//!
//! The hub parks messages whose transferables cannot cross the transport
//! they were sent on, and hands them out once by id. Only the storage relay
//! actually stores; every other context forwards to it.
//!
//! ```text
//!  page ──(broadcast: metadata)──► page
//!   │                               ▲
//!   │ store                   fetch │
//!   ▼                               │
//!  hub ──► relay page ──► storage relay ◄── hub
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Hub`] lifecycle, store/fetch, listen sources |
//! | `discovery` | Page strategy locating the storage relay |
//! | `forward` | Forwarding target and worker strategy |
//! | `options` | [`HubOptions`] |
//! | `state` | [`HubState`], [`BootstrapState`] |
//! | `storage` | Storage relay strategy |
//! | `strategy` | [`HubStrategy`] trait and per-kind table |

// ============================================================================
// Submodules
// ============================================================================

/// Hub lifecycle and listen sources.
pub mod core;

/// Page topology discovery.
pub mod discovery;

/// Forwarding to another hub.
pub mod forward;

/// Hub configuration.
pub mod options;

/// Lifecycle states.
pub mod state;

/// Storage relay store.
pub mod storage;

/// Strategy trait and table.
pub mod strategy;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Hub;
pub use discovery::DiscoveryStrategy;
pub use forward::{ForwardTarget, PassThroughStrategy};
pub use options::HubOptions;
pub use state::{BootstrapState, HubState};
pub use storage::StorageStrategy;
pub use strategy::HubStrategy;
