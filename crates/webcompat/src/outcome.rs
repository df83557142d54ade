//! Outcomes of probe bodies and the verdicts derived from them.
//!
//! A [`RunOutcome`] reports whether the site worked during one body run.
//! The classifier folds the with/without pair into a [`Verdict`], the
//! unit the exit code and reports are built from.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::result::SkipReason;

// =============================================================================
// RUN STATUS
// =============================================================================

/// Normalized status of a single body run.
///
/// `Pass` always means "the site worked as a user would expect", on both
/// sides of the intervention toggle. Bodies that probe for breakage
/// still report `Pass` when the site works; the classifier is the only
/// place that interprets the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// The site behaved correctly.
    Pass,
    /// The site exhibited the breakage the probe looks for.
    Fail,
    /// Host environment cannot exercise the probe.
    SkipEnvironment,
    /// Site content is gated by geography.
    SkipRegion,
    /// Site infrastructure prevented a meaningful run.
    SkipInfrastructure,
    /// Harness failure: nothing can be said about the site.
    Error,
}

impl RunStatus {
    /// Status string used in reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::SkipEnvironment => "skip-environment",
            Self::SkipRegion => "skip-region",
            Self::SkipInfrastructure => "skip-infrastructure",
            Self::Error => "error",
        }
    }

    /// Whether the site worked.
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Whether the site showed the probed breakage.
    #[must_use]
    pub const fn is_fail(&self) -> bool {
        matches!(self, Self::Fail)
    }

    /// Whether the run was skipped for any reason.
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::SkipEnvironment | Self::SkipRegion | Self::SkipInfrastructure
        )
    }

    /// Whether the harness itself failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SkipReason> for RunStatus {
    fn from(reason: &SkipReason) -> Self {
        match reason {
            SkipReason::Environment(_) => Self::SkipEnvironment,
            SkipReason::Region(_) => Self::SkipRegion,
            SkipReason::Infrastructure(_) => Self::SkipInfrastructure,
        }
    }
}

// =============================================================================
// DIAGNOSTICS
// =============================================================================

/// Evidence attached to a run outcome for report readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Human-readable explanation of the status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Last console messages captured before the run ended.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console_tail: Vec<String>,
    /// Path of a screenshot captured on failure, relative to the
    /// artifacts directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

// =============================================================================
// RUN OUTCOME
// =============================================================================

/// Result of one probe body run on one side of the intervention toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Normalized status.
    pub status: RunStatus,
    /// Evidence for report readers.
    #[serde(default)]
    pub diagnostics: Diagnostics,
    /// Wall-clock duration of the run in milliseconds.
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl RunOutcome {
    /// The site behaved correctly.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            status: RunStatus::Pass,
            diagnostics: Diagnostics::default(),
            elapsed_ms: 0,
        }
    }

    /// The site showed the probed breakage.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Fail,
            diagnostics: Diagnostics {
                message: Some(message.into()),
                ..Diagnostics::default()
            },
            elapsed_ms: 0,
        }
    }

    /// The run was skipped.
    #[must_use]
    pub fn skip(reason: &SkipReason) -> Self {
        Self {
            status: RunStatus::from(reason),
            diagnostics: Diagnostics {
                message: Some(reason.reason().to_string()),
                ..Diagnostics::default()
            },
            elapsed_ms: 0,
        }
    }

    /// The harness failed; the site was not meaningfully exercised.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            diagnostics: Diagnostics {
                message: Some(message.into()),
                ..Diagnostics::default()
            },
            elapsed_ms: 0,
        }
    }

    /// Record the wall-clock duration.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Attach captured console output.
    #[must_use]
    pub fn with_console_tail(mut self, tail: Vec<String>) -> Self {
        self.diagnostics.console_tail = tail;
        self
    }

    /// Attach a screenshot path.
    #[must_use]
    pub fn with_screenshot(mut self, path: impl Into<String>) -> Self {
        self.diagnostics.screenshot = Some(path.into());
        self
    }
}

// =============================================================================
// VERDICT
// =============================================================================

/// Classification of a probe's with/without outcome pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// Site works with the intervention and breaks without it. The
    /// expected steady state.
    WorkaroundStillNeeded,
    /// Site works on both sides. The intervention can be retired.
    WorkaroundObsolete,
    /// Site is broken on both sides. The intervention no longer rescues
    /// it.
    UnexpectedBothSidesFail,
    /// Site works only without the intervention. The intervention itself
    /// now breaks the site.
    UnexpectedInversion,
    /// The probe did not run to a meaningful pair.
    Skipped,
    /// The harness failed before a meaningful pair was produced.
    InfrastructureError,
}

impl Verdict {
    /// Verdict string used in reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WorkaroundStillNeeded => "workaround-still-needed",
            Self::WorkaroundObsolete => "workaround-obsolete",
            Self::UnexpectedBothSidesFail => "unexpected-both-sides-fail",
            Self::UnexpectedInversion => "unexpected-inversion",
            Self::Skipped => "skipped",
            Self::InfrastructureError => "infrastructure-error",
        }
    }

    /// Whether this verdict demands intervention maintenance and should
    /// fail the run.
    #[must_use]
    pub const fn is_regression(&self) -> bool {
        matches!(self, Self::WorkaroundObsolete | Self::UnexpectedInversion)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PROBE VERDICT
// =============================================================================

/// Verdict for one probe together with the evidence it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeVerdict {
    /// Classification of the outcome pair.
    pub verdict: Verdict,
    /// One-line explanation of how the verdict was reached.
    pub explanation: String,
    /// Outcome of the run with the intervention enabled.
    pub with_outcome: RunOutcome,
    /// Outcome of the run with the intervention disabled. `None` when
    /// the pair was aborted after the first side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub without_outcome: Option<RunOutcome>,
}

impl ProbeVerdict {
    /// Verdict for a probe skipped by the capability matcher, before any
    /// session existed.
    #[must_use]
    pub fn skipped_at_match(reason: &SkipReason) -> Self {
        Self {
            verdict: Verdict::Skipped,
            explanation: format!("not runnable here: {}", reason.reason()),
            with_outcome: RunOutcome::skip(reason),
            without_outcome: None,
        }
    }
}
