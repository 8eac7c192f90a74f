//! Execution contexts and the capabilities their host provides.
//!
//! Every context decides its [`ContextKind`] once, at construction, and
//! owns at most one [`Hub`].
//!
//! | Kind | Hub strategy | Typical host |
//! |------|--------------|--------------|
//! | [`ContextKind::Storage`] | stores | service worker at the relay origin |
//! | [`ContextKind::Worker`] | forwards to parent | dedicated worker |
//! | [`ContextKind::Page`] | discovers storage relay | window or frame |
//! | [`ContextKind::Worklet`] | none | audio/paint worklet |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::hub::{Hub, HubOptions};
use crate::identifiers::ContextId;
use crate::messenger::Messenger;
use crate::transport::{EndpointKind, EndpointRef};

// ============================================================================
// ContextKind
// ============================================================================

/// Kind of execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Storage relay (service worker); authoritative store.
    Storage,
    /// Dedicated worker; forwards to its parent.
    Worker,
    /// Window or frame.
    Page,
    /// Worklet; cannot host a hub.
    Worklet,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Storage => "storage",
            Self::Worker => "worker",
            Self::Page => "page",
            Self::Worklet => "worklet",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Host
// ============================================================================

/// Capabilities the embedding environment grants a context.
///
/// Only [`Host::scope`] is required; the rest default to "not available".
pub trait Host: Send + Sync {
    /// The context's own listening endpoint.
    ///
    /// For a dedicated worker this is the channel to its parent.
    fn scope(&self) -> Option<EndpointRef>;

    /// The context's origin, e.g. `https://app.example`.
    fn origin(&self) -> Option<String> {
        None
    }

    /// Endpoint to the storage relay controlling this page, if any.
    fn controller(&self) -> Option<EndpointRef> {
        None
    }

    /// Opens a hidden frame at `url` and returns an endpoint to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingEndpoint`] when frames cannot be opened.
    fn open_hidden_frame(&self, url: &Url) -> Result<EndpointRef> {
        Err(Error::missing_endpoint(format!("hidden frame for {url}")))
    }

    /// Posts a plain signal to the parent context.
    ///
    /// # Errors
    ///
    /// Whatever the parent transport reports.
    fn signal_parent(&self, _signal: &str) -> Result<()> {
        Ok(())
    }

    /// Reloads the context.
    fn reload(&self) {}
}

// ============================================================================
// ExecutionContext
// ============================================================================

/// One execution context and its lazily created hub.
///
/// # Example
///
/// ```ignore
/// let context = ExecutionContext::new(ContextKind::Page, host);
/// let channel = context.messenger(Arc::new(broadcast.join()))?;
/// channel.request("upload", json!({"name": "a.bin"}), Some(vec![buffer])).await?;
/// ```
pub struct ExecutionContext {
    id: ContextId,
    kind: ContextKind,
    host: Arc<dyn Host>,
    options: HubOptions,
    hub: Mutex<Option<Arc<Hub>>>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("hub", &self.hub.lock().is_some())
            .finish()
    }
}

impl ExecutionContext {
    /// Creates a context with default hub options.
    #[must_use]
    pub fn new(kind: ContextKind, host: Arc<dyn Host>) -> Self {
        Self {
            id: ContextId::next(),
            kind,
            host,
            options: HubOptions::default(),
            hub: Mutex::new(None),
        }
    }

    /// Creates a context with custom hub options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Url`] if the options are invalid.
    pub fn with_options(kind: ContextKind, host: Arc<dyn Host>, options: HubOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            ..Self::new(kind, host)
        })
    }

    /// Returns the context id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the context kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Returns the host capabilities.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Returns the hub options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &HubOptions {
        &self.options
    }

    /// Returns this context's hub, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedContext`] for worklets.
    pub fn hub(&self) -> Result<Arc<Hub>> {
        let mut slot = self.hub.lock();
        if let Some(hub) = slot.as_ref() {
            return Ok(Arc::clone(hub));
        }

        let hub = Hub::new(self.id, self.kind, Arc::clone(&self.host), self.options.clone())?;
        debug!(context = %self.id, kind = %self.kind, "Hub created");
        *slot = Some(Arc::clone(&hub));
        Ok(hub)
    }

    /// Creates and initializes the hub so the context starts serving.
    ///
    /// # Errors
    ///
    /// Construction or bootstrap errors.
    pub async fn boot(&self) -> Result<Arc<Hub>> {
        let hub = self.hub()?;
        hub.init().await?;
        Ok(hub)
    }

    /// Creates a messenger over `endpoint`.
    ///
    /// | Endpoint | Messenger |
    /// |----------|-----------|
    /// | cannot carry transferables | relays payloads through this context's hub |
    /// | [`EndpointKind::Worker`] | plain; the worker is also onboarded into the hub |
    /// | anything else | plain |
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedContext`] if a hub is needed in a worklet.
    pub fn messenger(&self, endpoint: EndpointRef) -> Result<Messenger> {
        if !endpoint.supports_transfer() {
            return Ok(Messenger::relayed(endpoint, self.hub()?));
        }
        if endpoint.kind() == EndpointKind::Worker {
            self.hub()?.attach_listener(Arc::clone(&endpoint))?;
        }
        Ok(Messenger::new(endpoint))
    }
}

// ============================================================================
// Tests
// ============================================================================
