//! Page strategy: locate the storage relay, then forward to it.
//!
//! # Bootstrap
//!
//! | Situation | Action | State |
//! |-----------|--------|-------|
//! | Storage relay controls this page | bind to it | `BoundDirect` |
//! | No controller, page is at the relay origin | reload after the backoff | `Reloading` |
//! | No controller, foreign origin | open one hidden relay page, bind to it once it signals | `AwaitingSecondaryPage` -> `BoundIndirect` |
//!
//! A relay-origin page that binds directly tells its parent it is ready.
//! Either way the page's own scope is onboarded so descendants can reach
//! the hub through it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::{Message, READY_SIGNAL};
use crate::transport::{EndpointRef, Listener};

use super::core::Hub;
use super::forward::ForwardTarget;
use super::state::BootstrapState;
use super::strategy::HubStrategy;

// ============================================================================
// DiscoveryStrategy
// ============================================================================

/// Page strategy forwarding to a discovered storage relay.
#[derive(Debug)]
pub struct DiscoveryStrategy {
    target: OnceLock<ForwardTarget>,
    state: Mutex<BootstrapState>,
}

impl Default for DiscoveryStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryStrategy {
    /// Creates an unbound strategy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: OnceLock::new(),
            state: Mutex::new(BootstrapState::AwaitingProbe),
        }
    }

    fn set_state(&self, state: BootstrapState) {
        trace!(?state, "Bootstrap state");
        *self.state.lock() = state;
    }

    fn bound(&self) -> Result<&ForwardTarget> {
        self.target
            .get()
            .ok_or_else(|| Error::protocol("page hub used before bootstrap"))
    }

    /// Waits out the backoff, reloads once per backoff window, and fails.
    async fn schedule_reload(&self, hub: &Hub) -> Result<()> {
        self.set_state(BootstrapState::Reloading);
        let backoff = hub.options().reload_backoff;
        sleep(backoff).await;

        if hub.reloads().try_acquire(backoff) {
            warn!(backoff_ms = backoff.as_millis(), "Storage relay not controlling, reloading");
            hub.host().reload();
        } else {
            debug!("Reload already requested recently");
        }

        Err(Error::reload_scheduled(millis(backoff)))
    }

    /// Opens the hidden relay page and waits for it to signal readiness.
    ///
    /// One frame per bootstrap; each attempt re-waits on that same frame.
    async fn open_relay_page(&self, hub: &Hub, relay_origin: &str) -> Result<EndpointRef> {
        self.set_state(BootstrapState::AwaitingSecondaryPage);
        let host = hub.host();
        let options = hub.options();
        let url = options.relay_url()?;
        let scope = host
            .scope()
            .ok_or_else(|| Error::missing_endpoint("page scope"))?;

        let mut listener = scope.listen();
        let frame = host.open_hidden_frame(&url)?;
        debug!(%url, "Relay page opened");

        for attempt in 1..=options.frame_attempts {
            match timeout(options.frame_ready_timeout, wait_for_ready(&mut listener, relay_origin)).await {
                Ok(true) => return Ok(frame),
                Ok(false) => return Err(Error::Disconnected),
                Err(_) => warn!(attempt, "Relay page did not signal readiness"),
            }
        }

        Err(Error::bootstrap_timeout(
            options.frame_attempts,
            millis(options.frame_ready_timeout),
        ))
    }
}

#[async_trait]
impl HubStrategy for DiscoveryStrategy {
    fn name(&self) -> &'static str {
        "discovery"
    }

    async fn bootstrap(&self, hub: &Hub) -> Result<()> {
        self.set_state(BootstrapState::AwaitingProbe);
        let host = hub.host();
        let relay_origin = hub.options().relay_origin()?;
        let at_relay = host.origin().as_deref() == Some(relay_origin.as_str());

        let (endpoint, state) = match host.controller() {
            Some(controller) => (controller, BootstrapState::BoundDirect),
            None if at_relay => return self.schedule_reload(hub).await,
            None => (
                self.open_relay_page(hub, &relay_origin).await?,
                BootstrapState::BoundIndirect,
            ),
        };

        if self.target.get().is_none() {
            let _ = self
                .target
                .set(ForwardTarget::new(endpoint, hub.options().request_timeout));
        }
        self.set_state(state);
        debug!(?state, "Page hub bound");

        let scope = host
            .scope()
            .ok_or_else(|| Error::missing_endpoint("page scope"))?;
        hub.attach_listener(scope)?;

        if at_relay {
            host.signal_parent(READY_SIGNAL)?;
        }
        Ok(())
    }

    async fn store(&self, message: Message) -> Result<()> {
        self.bound()?.store(message).await
    }

    async fn fetch(&self, id: MessageId) -> Result<Message> {
        self.bound()?.fetch(id).await
    }

    fn bootstrap_state(&self) -> Option<BootstrapState> {
        Some(*self.state.lock())
    }
}

// ============================================================================
// ReloadThrottle
// ============================================================================

/// Limits reloads to one per backoff window.
#[derive(Debug, Default)]
pub struct ReloadThrottle {
    last: Mutex<Option<Instant>>,
}

impl ReloadThrottle {
    /// Claims the right to reload unless one happened within `window`.
    pub fn try_acquire(&self, window: Duration) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        if last.is_some_and(|at| now.duration_since(at) < window) {
            return false;
        }
        *last = Some(now);
        true
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Waits for the readiness signal from `origin`; `false` if the scope closed.
async fn wait_for_ready(listener: &mut Listener, origin: &str) -> bool {
    while let Some(delivery) = listener.recv().await {
        if delivery.data.as_str() == Some(READY_SIGNAL) && delivery.origin.as_deref() == Some(origin) {
            return true;
        }
        trace!(origin = ?delivery.origin, "Ignoring non-ready delivery");
    }
    false
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
