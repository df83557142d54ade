//! Result and error types for the intervention harness.
//!
//! One error enum covers the whole stack: the wire-level faults raised by
//! the transport, the element-level failures surfaced to probe bodies, and
//! the skip signals probes use as control flow. Probe bodies distinguish
//! skip signals from assertion failures; the executor folds everything
//! else into the run outcome taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for harness operations.
pub type WebcompatResult<T> = Result<T, WebcompatError>;

/// Reason a probe was bypassed rather than failed.
///
/// Skip signals are control-flow exits, not failures: a probe that cannot
/// run in this environment, region, or infrastructure state is reported as
/// skipped and never counts against the verdict table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "kebab-case")]
pub enum SkipReason {
    /// The environment cannot host this probe (platform, version,
    /// scrollbars, emulation, headless captcha).
    Environment(String),
    /// The serving region denies access to the target site.
    Region(String),
    /// Required infrastructure (login endpoint, third-party frame) is
    /// unreachable in a way unrelated to the intervention under test.
    Infrastructure(String),
}

impl SkipReason {
    /// Free-text explanation carried by the signal.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Environment(r) | Self::Region(r) | Self::Infrastructure(r) => r,
        }
    }

    /// Short kind label used in run records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Environment(_) => "skip-environment",
            Self::Region(_) => "skip-region",
            Self::Infrastructure(_) => "skip-infrastructure",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.reason())
    }
}

/// Errors raised by the harness.
#[derive(Debug, Error)]
pub enum WebcompatError {
    /// No element matched the locator within its wait budget.
    #[error("no such element: {message}")]
    NoSuchElement {
        /// Locator description and wait budget.
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("{what} timed out after {ms}ms")]
    Timeout {
        /// What was being waited on.
        what: String,
        /// Deadline in milliseconds.
        ms: u64,
    },

    /// A click landed on an overlaying element instead of the target.
    #[error("element click intercepted: {message}")]
    ElementClickIntercepted {
        /// Endpoint-provided description of the intercepting element.
        message: String,
    },

    /// An element reference outlived the document it belongs to.
    #[error("stale element reference: {message}")]
    StaleElementReference {
        /// Endpoint-provided detail.
        message: String,
    },

    /// A native dialog opened while a command was in flight.
    #[error("unexpected alert open: {text}")]
    UnexpectedAlert {
        /// Text of the dialog.
        text: String,
    },

    /// The endpoint cannot perform the requested operation.
    #[error("unsupported operation: {message}")]
    UnsupportedOperation {
        /// Endpoint-provided detail.
        message: String,
    },

    /// The session id is no longer known to the endpoint.
    #[error("invalid session id: {message}")]
    InvalidSessionId {
        /// Endpoint-provided detail.
        message: String,
    },

    /// The automation endpoint refused the connection.
    #[error("connection refused: {message}")]
    ConnectionRefused {
        /// Socket-level detail.
        message: String,
    },

    /// A navigation was superseded before it produced a document.
    ///
    /// Probes testing early-abort scenarios treat this as a signal rather
    /// than a failure.
    #[error("navigation aborted: {url}")]
    NavigationAborted {
        /// URL of the superseded navigation.
        url: String,
    },

    /// Socket-level fault below the protocol (broken pipe, reset, TLS).
    #[error("transport fault: {message}")]
    Transport {
        /// Socket-level detail.
        message: String,
    },

    /// Structured error response from the WebDriver endpoint that does not
    /// map to a more specific variant.
    #[error("protocol error `{kind}`: {message}")]
    Protocol {
        /// WebDriver error code (the `error` field of the response).
        kind: String,
        /// Endpoint-provided message.
        message: String,
    },

    /// The browser or driver process could not be started.
    #[error("browser launch failed: {message}")]
    Launch {
        /// Spawn or readiness detail.
        message: String,
    },

    /// A probe body assertion did not hold.
    #[error("assertion failed: {message}")]
    Assertion {
        /// What was asserted and what was observed.
        message: String,
    },

    /// Control-flow exit: the probe cannot produce a meaningful verdict
    /// here and must be reported as skipped.
    #[error("{0}")]
    Skipped(SkipReason),

    /// Probe file could not be parsed or validated.
    #[error("probe rejected: {0}")]
    Probe(#[from] crate::probe::ProbeParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WebcompatError {
    /// Build a transport fault.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Build a protocol error from a WebDriver error code and message.
    pub fn protocol(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Build a timeout for a named wait.
    pub fn timeout(what: impl Into<String>, ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            ms,
        }
    }

    /// Build an assertion failure.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }

    /// Build a launch failure.
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    /// Build an environment skip signal.
    pub fn skip_environment(reason: impl Into<String>) -> Self {
        Self::Skipped(SkipReason::Environment(reason.into()))
    }

    /// Build a region skip signal.
    pub fn skip_region(reason: impl Into<String>) -> Self {
        Self::Skipped(SkipReason::Region(reason.into()))
    }

    /// Build an infrastructure skip signal.
    pub fn skip_infrastructure(reason: impl Into<String>) -> Self {
        Self::Skipped(SkipReason::Infrastructure(reason.into()))
    }

    /// Whether this error is a skip signal.
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Whether this error indicates broken harness infrastructure rather
    /// than observed site behavior. Infrastructure faults become `error`
    /// outcomes and are retried once on a fresh session.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::InvalidSessionId { .. }
                | Self::Transport { .. }
                | Self::Protocol { .. }
                | Self::Launch { .. }
                | Self::UnsupportedOperation { .. }
                | Self::Io(_)
                | Self::Json(_)
        )
    }
}
