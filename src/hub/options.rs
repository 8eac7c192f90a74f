//! Hub configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use post_relay::HubOptions;
//!
//! let options = HubOptions::new()
//!     .with_relay_url("https://relay.example/iframe/")
//!     .with_request_timeout(Duration::from_secs(2))
//!     .with_max_entries(512);
//!
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Well-known address of the relay page.
pub const DEFAULT_RELAY_URL: &str = "https://freezm-ltd.github.io/post-together/iframe/";

/// Budget for a forwarded store/fetch request.
pub const DEFAULT_HUB_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long one relay page gets to signal readiness.
pub const DEFAULT_FRAME_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay pages opened before giving up.
pub const DEFAULT_FRAME_ATTEMPTS: u32 = 3;

/// Delay before reloading a relay-origin page with no controller.
pub const DEFAULT_RELOAD_BACKOFF: Duration = Duration::from_secs(1);

/// Lifetime of an unclaimed stored message.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(300);

/// Stored messages held at once.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

// ============================================================================
// HubOptions
// ============================================================================

/// Tunables for hub bootstrap and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubOptions {
    /// Address of the relay page opened by pages without a controller.
    pub relay_url: String,

    /// Budget for forwarded store/fetch requests.
    pub request_timeout: Duration,

    /// Per-attempt wait for the relay page's readiness signal.
    pub frame_ready_timeout: Duration,

    /// Relay page attempts before bootstrap fails.
    pub frame_attempts: u32,

    /// Delay before a controller-less relay-origin page reloads.
    pub reload_backoff: Duration,

    /// Lifetime of stored messages; `None` keeps them until fetched.
    pub entry_ttl: Option<Duration>,

    /// Maximum number of stored messages.
    pub max_entries: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl HubOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            request_timeout: DEFAULT_HUB_REQUEST_TIMEOUT,
            frame_ready_timeout: DEFAULT_FRAME_READY_TIMEOUT,
            frame_attempts: DEFAULT_FRAME_ATTEMPTS,
            reload_backoff: DEFAULT_RELOAD_BACKOFF,
            entry_ttl: Some(DEFAULT_ENTRY_TTL),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl HubOptions {
    /// Sets the relay page address.
    #[inline]
    #[must_use]
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = url.into();
        self
    }

    /// Sets the forwarded request budget.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the per-attempt readiness wait.
    #[inline]
    #[must_use]
    pub fn with_frame_ready_timeout(mut self, timeout: Duration) -> Self {
        self.frame_ready_timeout = timeout;
        self
    }

    /// Sets the number of relay page attempts.
    #[inline]
    #[must_use]
    pub fn with_frame_attempts(mut self, attempts: u32) -> Self {
        self.frame_attempts = attempts;
        self
    }

    /// Sets the reload backoff.
    #[inline]
    #[must_use]
    pub fn with_reload_backoff(mut self, backoff: Duration) -> Self {
        self.reload_backoff = backoff;
        self
    }

    /// Sets the stored message lifetime.
    #[inline]
    #[must_use]
    pub fn with_entry_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Sets the stored message cap.
    #[inline]
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl HubOptions {
    /// Checks the options for consistency.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the relay URL does not parse
    /// - [`Error::Config`] if a limit is zero or the relay URL has no origin
    pub fn validate(&self) -> Result<()> {
        self.relay_origin()?;

        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be non-zero"));
        }
        if self.frame_ready_timeout.is_zero() {
            return Err(Error::config("frame_ready_timeout must be non-zero"));
        }
        if self.frame_attempts == 0 {
            return Err(Error::config("frame_attempts must be at least 1"));
        }
        if self.max_entries == 0 {
            return Err(Error::config("max_entries must be at least 1"));
        }
        if self.entry_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(Error::config("entry_ttl must be non-zero when set"));
        }
        Ok(())
    }

    /// Parses the relay URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if it does not parse.
    pub fn relay_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.relay_url)?)
    }

    /// Returns the serialized origin of the relay URL.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the relay URL does not parse
    /// - [`Error::Config`] if the URL has an opaque origin
    pub fn relay_origin(&self) -> Result<String> {
        let origin = self.relay_url()?.origin();
        if !origin.is_tuple() {
            return Err(Error::config(format!(
                "relay url {} has no origin",
                self.relay_url
            )));
        }
        Ok(origin.ascii_serialization())
    }
}

// ============================================================================
// Tests
// ============================================================================
