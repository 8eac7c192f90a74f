//! Per-context hub: lifecycle, store/fetch, and listen sources.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::context::{ContextKind, Host};
use crate::error::{Error, Result};
use crate::identifiers::{ContextId, EndpointId, MessageId};
use crate::messenger::{Messenger, Responder};
use crate::protocol::hub::{id_from_fetch_request, message_from_store_request};
use crate::protocol::{FETCH_MESSAGE_TYPE, FetchReply, Message, Payload, STORE_MESSAGE_TYPE, StoreReply};
use crate::transport::EndpointRef;

use super::discovery::ReloadThrottle;
use super::options::HubOptions;
use super::state::{BootstrapState, HubState};
use super::strategy::{self, HubStrategy};

// ============================================================================
// Constants
// ============================================================================

/// Initializations a store/fetch sits through before giving up on a hub
/// that keeps being rebound.
const MAX_INIT_ROUNDS: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// Lifecycle snapshot published to waiting callers.
#[derive(Debug)]
struct Phase {
    state: HubState,
    generation: u64,
    strategy: Arc<dyn HubStrategy>,
    failure: Option<String>,
}

/// What an `init` caller has to do.
enum Claim {
    Ready,
    Busy(u64),
    Run(u64, Arc<dyn HubStrategy>),
}

// ============================================================================
// Hub
// ============================================================================

/// Relay store for messages whose payload cannot travel with them.
///
/// One hub exists per execution context (see
/// [`ExecutionContext::hub`](crate::ExecutionContext::hub)). Its behaviour
/// comes from a [`HubStrategy`] chosen by the context kind.
///
/// Initialization runs at most once at a time: the first caller bootstraps,
/// concurrent callers wait for its outcome. A failed or cancelled bootstrap
/// leaves the hub off so the next caller tries again.
pub struct Hub {
    context: ContextId,
    kind: ContextKind,
    host: Arc<dyn Host>,
    options: HubOptions,
    phase: watch::Sender<Phase>,
    sources: Mutex<FxHashMap<EndpointId, Messenger>>,
    reloads: ReloadThrottle,
    me: Weak<Hub>,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = self.phase.borrow();
        f.debug_struct("Hub")
            .field("context", &self.context)
            .field("kind", &self.kind)
            .field("state", &phase.state)
            .field("generation", &phase.generation)
            .field("strategy", &phase.strategy.name())
            .field("sources", &self.sources.lock().len())
            .finish()
    }
}

// ============================================================================
// Hub - Constructors
// ============================================================================

impl Hub {
    /// Creates an uninitialized hub for a context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedContext`] for worklets.
    pub fn new(context: ContextId, kind: ContextKind, host: Arc<dyn Host>, options: HubOptions) -> Result<Arc<Self>> {
        let strategy = strategy::for_kind(kind, &options)?;
        let (phase, _) = watch::channel(Phase {
            state: HubState::Off,
            generation: 0,
            strategy,
            failure: None,
        });

        Ok(Arc::new_cyclic(|me| Self {
            context,
            kind,
            host,
            options,
            phase,
            sources: Mutex::new(FxHashMap::default()),
            reloads: ReloadThrottle::default(),
            me: me.clone(),
        }))
    }
}

// ============================================================================
// Hub - Accessors
// ============================================================================

impl Hub {
    /// Returns the owning context's id.
    #[inline]
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// Returns the owning context's kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> HubState {
        self.phase.borrow().state
    }

    /// Returns the number of rebinds so far.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.phase.borrow().generation
    }

    /// Returns the active strategy's name.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.phase.borrow().strategy.name()
    }

    /// Returns topology discovery progress (page hubs only).
    #[must_use]
    pub fn bootstrap_state(&self) -> Option<BootstrapState> {
        self.phase.borrow().strategy.bootstrap_state()
    }

    /// Returns the number of onboarded listen sources.
    #[inline]
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    /// Returns the hub options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &HubOptions {
        &self.options
    }

    /// Returns the host capabilities of the owning context.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    #[inline]
    pub(crate) fn reloads(&self) -> &ReloadThrottle {
        &self.reloads
    }
}

// ============================================================================
// Hub - Lifecycle
// ============================================================================

impl Hub {
    /// Brings the hub to [`HubState::On`].
    ///
    /// Returns immediately when already on; waits for an in-flight
    /// bootstrap; otherwise bootstraps.
    ///
    /// # Errors
    ///
    /// - The bootstrap error, for the caller that ran it
    /// - [`Error::Bootstrap`] for callers that waited on a failed bootstrap
    /// - [`Error::HubRebound`] if the hub was rebound meanwhile
    pub async fn init(&self) -> Result<()> {
        match self.claim() {
            Claim::Ready => Ok(()),
            Claim::Busy(generation) => self.wait_for_init(generation).await,
            Claim::Run(generation, strategy) => self.run_bootstrap(generation, strategy).await,
        }
    }

    /// Installs a fresh strategy and returns the hub to `Off`.
    ///
    /// A bootstrap still running for the previous strategy will not turn
    /// the hub on. Onboarded listen sources are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedContext`] if no strategy exists for this kind.
    pub fn rebind(&self) -> Result<()> {
        let strategy = strategy::for_kind(self.kind, &self.options)?;
        let mut generation = 0;
        self.phase.send_modify(|phase| {
            phase.generation += 1;
            phase.state = HubState::Off;
            phase.strategy = strategy;
            phase.failure = None;
            generation = phase.generation;
        });

        debug!(context = %self.context, generation, "Hub rebound");
        Ok(())
    }

    fn claim(&self) -> Claim {
        let mut claim = Claim::Ready;
        self.phase.send_if_modified(|phase| match phase.state {
            HubState::On => false,
            HubState::Initializing => {
                claim = Claim::Busy(phase.generation);
                false
            }
            HubState::Off => {
                phase.state = HubState::Initializing;
                phase.failure = None;
                claim = Claim::Run(phase.generation, Arc::clone(&phase.strategy));
                true
            }
        });
        claim
    }

    async fn wait_for_init(&self, generation: u64) -> Result<()> {
        let mut phase_rx = self.phase.subscribe();
        let phase = phase_rx
            .wait_for(|phase| phase.generation != generation || phase.state != HubState::Initializing)
            .await
            .map_err(|_| Error::Disconnected)?;

        if phase.generation != generation {
            return Err(Error::HubRebound);
        }
        match phase.state {
            HubState::On => Ok(()),
            _ => Err(Error::bootstrap(
                phase
                    .failure
                    .clone()
                    .unwrap_or_else(|| "initialization cancelled".to_string()),
            )),
        }
    }

    async fn run_bootstrap(&self, generation: u64, strategy: Arc<dyn HubStrategy>) -> Result<()> {
        debug!(
            context = %self.context,
            kind = %self.kind,
            strategy = strategy.name(),
            generation,
            "Hub initializing"
        );

        let mut guard = InitGuard {
            phase: &self.phase,
            generation,
            armed: true,
        };
        let result = strategy.bootstrap(self).await;
        guard.armed = false;

        let mut stale = false;
        self.phase.send_if_modified(|phase| {
            if phase.generation != generation {
                stale = true;
                return false;
            }
            match &result {
                Ok(()) => {
                    phase.state = HubState::On;
                    phase.failure = None;
                }
                Err(e) => {
                    phase.state = HubState::Off;
                    phase.failure = Some(e.to_string());
                }
            }
            true
        });

        if stale {
            debug!(context = %self.context, generation, "Bootstrap outlived its generation");
            return Err(Error::HubRebound);
        }

        match &result {
            Ok(()) => debug!(context = %self.context, strategy = strategy.name(), "Hub on"),
            Err(e) => debug!(context = %self.context, error = %e, "Hub bootstrap failed"),
        }
        result
    }

    /// Initializes and returns the strategy that is on.
    async fn ready_strategy(&self) -> Result<Arc<dyn HubStrategy>> {
        for _ in 0..MAX_INIT_ROUNDS {
            self.init().await?;
            let ready = {
                let phase = self.phase.borrow();
                (phase.state == HubState::On).then(|| Arc::clone(&phase.strategy))
            };
            if let Some(strategy) = ready {
                return Ok(strategy);
            }
        }
        Err(Error::HubRebound)
    }
}

/// Returns an abandoned initialization to `Off`.
struct InitGuard<'a> {
    phase: &'a watch::Sender<Phase>,
    generation: u64,
    armed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.phase.send_if_modified(|phase| {
            if phase.generation != self.generation || phase.state != HubState::Initializing {
                return false;
            }
            phase.state = HubState::Off;
            phase.failure = Some("initialization cancelled".to_string());
            true
        });
    }
}

// ============================================================================
// Hub - Store / Fetch
// ============================================================================

impl Hub {
    /// Parks `message` (with its transferables) under its id.
    ///
    /// # Errors
    ///
    /// Initialization errors, or the strategy's store failure.
    pub async fn store(&self, message: Message) -> Result<()> {
        let strategy = self.ready_strategy().await?;
        strategy.store(message).await
    }

    /// Removes and returns the message parked under `id`.
    ///
    /// # Errors
    ///
    /// Initialization errors, or [`Error::MessageNotFound`] / a forwarding failure.
    pub async fn fetch(&self, id: MessageId) -> Result<Message> {
        let strategy = self.ready_strategy().await?;
        strategy.fetch(id).await
    }
}

// ============================================================================
// Hub - Listen Sources
// ============================================================================

impl Hub {
    /// Serves store/fetch requests arriving over `endpoint`.
    ///
    /// Initializes the hub first. An endpoint already onboarded is skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::TransferUnsupported`] if the endpoint cannot carry transferables
    /// - Initialization errors
    pub async fn add_listen(&self, endpoint: EndpointRef) -> Result<()> {
        if !endpoint.supports_transfer() {
            return Err(Error::TransferUnsupported { kind: endpoint.kind() });
        }
        self.init().await?;
        self.attach_listener(endpoint)
    }

    /// Onboards `endpoint` without initializing; used during bootstrap.
    pub(crate) fn attach_listener(&self, endpoint: EndpointRef) -> Result<()> {
        if !endpoint.supports_transfer() {
            return Err(Error::TransferUnsupported { kind: endpoint.kind() });
        }

        let id = endpoint.id();
        let mut sources = self.sources.lock();
        if sources.contains_key(&id) {
            trace!(endpoint = %id, "Listen source already onboarded");
            return Ok(());
        }

        let messenger = Messenger::new(endpoint);
        messenger.response(STORE_MESSAGE_TYPE, &self.store_responder())?;
        messenger.response(FETCH_MESSAGE_TYPE, &self.fetch_responder())?;
        sources.insert(id, messenger);

        debug!(context = %self.context, endpoint = %id, "Listen source onboarded");
        Ok(())
    }

    fn store_responder(&self) -> Responder {
        let hub = self.me.clone();
        Responder::new(move |payload: Payload| {
            let hub = hub.clone();
            async move {
                let result = match hub.upgrade() {
                    Some(hub) => hub.store_forwarded(payload).await,
                    None => Err(Error::Disconnected),
                };
                Ok::<Value, Error>(serde_json::to_value(StoreReply::from_result(&result))?)
            }
        })
    }

    fn fetch_responder(&self) -> Responder {
        let hub = self.me.clone();
        Responder::new(move |payload: Payload| {
            let hub = hub.clone();
            async move {
                let result = match hub.upgrade() {
                    Some(hub) => hub.fetch_forwarded(payload.data).await,
                    None => Err(Error::Disconnected),
                };
                FetchReply::into_payload(result)
            }
        })
    }

    async fn store_forwarded(&self, payload: Payload) -> Result<()> {
        let message = message_from_store_request(payload)?;
        self.store(message).await
    }

    async fn fetch_forwarded(&self, data: Value) -> Result<Message> {
        let id = id_from_fetch_request(data)?;
        self.fetch(id).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use crate::transport::{BroadcastChannel, Mailbox, PortEndpoint, ServerEndpoint};

    /// Host of a storage relay whose bootstrap can be slowed down.
    #[derive(Debug)]
    struct StorageHost {
        scope: EndpointRef,
    }

    impl Host for StorageHost {
        fn scope(&self) -> Option<EndpointRef> {
            Some(Arc::clone(&self.scope))
        }
    }

    #[derive(Debug, Default)]
    struct EmptyHost {
        probes: AtomicUsize,
    }

    impl Host for EmptyHost {
        fn scope(&self) -> Option<EndpointRef> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    /// Page whose relay frame never signals readiness.
    #[derive(Debug)]
    struct SilentFrameHost {
        scope: EndpointRef,
    }

    impl Host for SilentFrameHost {
        fn scope(&self) -> Option<EndpointRef> {
            Some(Arc::clone(&self.scope))
        }

        fn open_hidden_frame(&self, _url: &url::Url) -> Result<EndpointRef> {
            Ok(Arc::new(PortEndpoint::pair().0))
        }
    }

    fn silent_page_hub() -> Arc<Hub> {
        let host = SilentFrameHost {
            scope: Arc::new(ServerEndpoint::new(Mailbox::new())),
        };
        Hub::new(ContextId::next(), ContextKind::Page, Arc::new(host), HubOptions::new()).expect("hub")
    }

    fn storage_hub() -> Arc<Hub> {
        let host = StorageHost {
            scope: Arc::new(ServerEndpoint::new(Mailbox::new())),
        };
        Hub::new(ContextId::next(), ContextKind::Storage, Arc::new(host), HubOptions::new()).expect("hub")
    }

    fn message(n: i64) -> Message {
        Message::request("upload", Payload::new(json!(n)))
    }

    #[tokio::test]
    async fn test_store_initializes_and_fetch_consumes() {
        let hub = storage_hub();
        assert_eq!(hub.state(), HubState::Off);

        let stored = message(7);
        let id = stored.id;
        hub.store(stored).await.expect("store");
        assert_eq!(hub.state(), HubState::On);
        assert_eq!(hub.source_count(), 1);

        assert_eq!(hub.fetch(id).await.expect("fetch").payload, Some(json!(7)));
        assert!(matches!(hub.fetch(id).await, Err(Error::MessageNotFound { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_init_bootstraps_once() {
        let hub = storage_hub();
        let (a, b, c) = tokio::join!(hub.init(), hub.init(), hub.init());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(hub.source_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_bootstrap_returns_to_off() {
        let host = Arc::new(EmptyHost::default());
        let hub = Hub::new(ContextId::next(), ContextKind::Storage, host.clone(), HubOptions::new()).expect("hub");

        let err = hub.init().await.expect_err("no scope");
        assert!(matches!(err, Error::MissingEndpoint { .. }));
        assert_eq!(hub.state(), HubState::Off);

        assert!(hub.init().await.is_err());
        assert_eq!(host.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worklet_has_no_hub() {
        let err = Hub::new(
            ContextId::next(),
            ContextKind::Worklet,
            Arc::new(EmptyHost::default()),
            HubOptions::new(),
        )
        .expect_err("worklet");
        assert!(matches!(err, Error::UnsupportedContext { .. }));
    }

    #[tokio::test]
    async fn test_add_listen_rejects_broadcast_and_dedups() {
        let hub = storage_hub();
        let channel = BroadcastChannel::new("no-transfer");
        let err = hub
            .add_listen(Arc::new(channel.join()))
            .await
            .expect_err("broadcast");
        assert!(matches!(err, Error::TransferUnsupported { .. }));

        let (port, _peer) = PortEndpoint::pair();
        let port: EndpointRef = Arc::new(port);
        hub.add_listen(Arc::clone(&port)).await.expect("first");
        hub.add_listen(port).await.expect("second");
        assert_eq!(hub.source_count(), 2);
    }

    #[tokio::test]
    async fn test_rebind_resets_state_and_keeps_sources() {
        let hub = storage_hub();
        hub.init().await.expect("init");
        let stored = message(1);
        let id = stored.id;
        hub.store(stored).await.expect("store");

        hub.rebind().expect("rebind");
        assert_eq!(hub.state(), HubState::Off);
        assert_eq!(hub.generation(), 1);
        assert_eq!(hub.source_count(), 1);

        assert!(hub.fetch(id).await.is_err());
        assert_eq!(hub.state(), HubState::On);
    }

    #[tokio::test]
    async fn test_cancelled_init_returns_to_off() {
        let hub = silent_page_hub();

        let abandoned = tokio::time::timeout(Duration::from_millis(20), hub.init()).await;
        assert!(abandoned.is_err());
        assert_eq!(hub.state(), HubState::Off);
        assert_eq!(hub.bootstrap_state(), Some(BootstrapState::AwaitingSecondaryPage));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebind_during_init_fails_callers() {
        let hub = silent_page_hub();

        let running = tokio::spawn({
            let hub = Arc::clone(&hub);
            async move { hub.init().await }
        });
        while hub.state() != HubState::Initializing {
            tokio::task::yield_now().await;
        }

        let (parked, ()) = tokio::join!(hub.init(), async {
            hub.rebind().expect("rebind");
        });
        assert!(matches!(parked, Err(Error::HubRebound)));

        let first = running.await.expect("join");
        assert!(matches!(first, Err(Error::HubRebound)));
        assert_eq!(hub.state(), HubState::Off);
        assert_eq!(hub.generation(), 1);
    }

    #[tokio::test]
    async fn test_forwarded_store_and_fetch_over_port() {
        let hub = storage_hub();
        let (near, far) = PortEndpoint::pair();
        hub.add_listen(Arc::new(far)).await.expect("listen");

        let target = super::super::forward::ForwardTarget::new(Arc::new(near), Duration::from_secs(1));
        let stored = message(42);
        let id = stored.id;
        target.store(stored).await.expect("forwarded store");
        assert_eq!(target.fetch(id).await.expect("forwarded fetch").payload, Some(json!(42)));
    }
}
