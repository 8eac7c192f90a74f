//! Hub lifecycle and bootstrap states.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// HubState
// ============================================================================

/// Readiness of a hub.
///
/// `Off -> Initializing -> On`. A failed, cancelled or rebound
/// initialization returns to `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HubState {
    /// Not initialized; the next caller bootstraps.
    #[default]
    Off,
    /// A bootstrap is in flight; callers wait for it.
    Initializing,
    /// Ready to store and fetch.
    On,
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Initializing => "initializing",
            Self::On => "on",
        };
        f.write_str(name)
    }
}

// ============================================================================
// BootstrapState
// ============================================================================

/// Progress of a page hub locating its storage relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    /// Checking for a controlling storage relay.
    AwaitingProbe,
    /// Bound to the controlling storage relay.
    BoundDirect,
    /// Waiting for the hidden relay page to signal readiness.
    AwaitingSecondaryPage,
    /// Bound to the relay page, which forwards to its storage relay.
    BoundIndirect,
    /// Reloading to let the storage relay take control.
    Reloading,
}

impl BootstrapState {
    /// Returns `true` once a forwarding target is bound.
    #[inline]
    #[must_use]
    pub const fn is_bound(self) -> bool {
        matches!(self, Self::BoundDirect | Self::BoundIndirect)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_off() {
        assert_eq!(HubState::default(), HubState::Off);
        assert_eq!(HubState::Initializing.to_string(), "initializing");
    }

    #[test]
    fn test_bound_states() {
        assert!(BootstrapState::BoundDirect.is_bound());
        assert!(BootstrapState::BoundIndirect.is_bound());
        assert!(!BootstrapState::Reloading.is_bound());
    }
}
