//! Wait options for navigation and element lookup.
//!
//! Probe bodies suspend at well-defined points: navigation readiness,
//! element waits, event-listener awaits, and explicit sleeps. Every
//! suspension takes a timeout; the types here carry those budgets.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for element waits (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default timeout for navigation readiness (30 seconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default per-probe deadline enforced by the engine (seconds)
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// NAVIGATION READINESS
// =============================================================================

/// How long `navigate` blocks before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationWait {
    /// Return as soon as the new navigation begins; the document may
    /// still be loading.
    None,
    /// Return once the document has left the `loading` ready state.
    #[default]
    Load,
    /// Return only when `document.readyState` is `complete`.
    Complete,
}

impl NavigationWait {
    /// Whether the given `document.readyState` value satisfies this mode.
    #[must_use]
    pub fn is_satisfied_by(&self, ready_state: &str) -> bool {
        match self {
            Self::None => true,
            Self::Load => ready_state != "loading",
            Self::Complete => ready_state == "complete",
        }
    }

    /// Label used in diagnostics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Load => "load",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for NavigationWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for element waits.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Maximum time to wait before giving up.
    pub timeout: Duration,
    /// Interval between lookup attempts.
    pub poll_interval: Duration,
    /// Visibility requirement: `Some(true)` accepts only displayed
    /// elements, `Some(false)` only hidden ones, `None` any match.
    pub displayed: Option<bool>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            displayed: None,
        }
    }
}

impl WaitOptions {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wait timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the polling interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Require the element to be displayed (or hidden).
    #[must_use]
    pub const fn displayed(mut self, displayed: bool) -> Self {
        self.displayed = Some(displayed);
        self
    }
}

// =============================================================================
// NAVIGATION OPTIONS
// =============================================================================

/// Options for `navigate`.
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    /// Readiness mode to block on.
    pub wait: NavigationWait,
    /// Deadline for reaching that readiness.
    pub timeout: Duration,
    /// If set, a console listener is armed before the navigation command
    /// is issued and the call waits for a console entry containing this
    /// substring after readiness.
    pub expect_console_message: Option<String>,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            wait: NavigationWait::default(),
            timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
            expect_console_message: None,
        }
    }
}

impl NavigateOptions {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the readiness mode.
    #[must_use]
    pub const fn wait(mut self, wait: NavigationWait) -> Self {
        self.wait = wait;
        self
    }

    /// Set the readiness deadline.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for a console entry containing `substring` after navigating.
    #[must_use]
    pub fn expect_console_message(mut self, substring: impl Into<String>) -> Self {
        self.expect_console_message = Some(substring.into());
        self
    }
}
