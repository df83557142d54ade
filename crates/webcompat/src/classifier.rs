//! Folds a with/without outcome pair into a verdict.
//!
//! The table is ordered: skips trump errors, and both trump the
//! pass/fail grid. The first matching row decides.
//!
//! | with | without | verdict |
//! |------|---------|---------|
//! | pass | fail    | workaround-still-needed |
//! | pass | pass    | workaround-obsolete |
//! | fail | fail    | unexpected-both-sides-fail |
//! | fail | pass    | unexpected-inversion |

use crate::outcome::{ProbeVerdict, RunOutcome, Verdict};

/// Classify an outcome pair. `without` is `None` when the pair was
/// aborted after the intervention-enabled side.
#[must_use]
pub fn classify(with: &RunOutcome, without: Option<&RunOutcome>) -> (Verdict, String) {
    if with.status.is_skip() {
        return (Verdict::Skipped, skip_explanation(with, "enabled"));
    }
    if let Some(without) = without {
        if without.status.is_skip() {
            return (Verdict::Skipped, skip_explanation(without, "disabled"));
        }
    }
    if with.status.is_error() {
        return (
            Verdict::InfrastructureError,
            error_explanation(with, "enabled"),
        );
    }
    if let Some(without) = without {
        if without.status.is_error() {
            return (
                Verdict::InfrastructureError,
                error_explanation(without, "disabled"),
            );
        }
    }
    let Some(without) = without else {
        // The engine only aborts a pair after a skip or error, so a
        // lone pass/fail should not happen. Treat it as harness
        // trouble rather than inventing a site verdict.
        return (
            Verdict::InfrastructureError,
            "intervention-disabled run never completed".to_string(),
        );
    };
    match (with.status.is_pass(), without.status.is_pass()) {
        (true, false) => (
            Verdict::WorkaroundStillNeeded,
            "site works with the intervention and breaks without it".to_string(),
        ),
        (true, true) => (
            Verdict::WorkaroundObsolete,
            "site works on both sides; the intervention makes no difference".to_string(),
        ),
        (false, false) => (
            Verdict::UnexpectedBothSidesFail,
            "site is broken even with the intervention".to_string(),
        ),
        (false, true) => (
            Verdict::UnexpectedInversion,
            "site works only without the intervention".to_string(),
        ),
    }
}

/// Classify and package the pair with its evidence.
#[must_use]
pub fn verdict_for(with: RunOutcome, without: Option<RunOutcome>) -> ProbeVerdict {
    let (verdict, explanation) = classify(&with, without.as_ref());
    ProbeVerdict {
        verdict,
        explanation,
        with_outcome: with,
        without_outcome: without,
    }
}

fn skip_explanation(outcome: &RunOutcome, side: &str) -> String {
    match outcome.diagnostics.message.as_deref() {
        Some(message) => format!("skipped during the intervention-{side} run: {message}"),
        None => format!("skipped during the intervention-{side} run"),
    }
}

fn error_explanation(outcome: &RunOutcome, side: &str) -> String {
    match outcome.diagnostics.message.as_deref() {
        Some(message) => format!("harness failure on the intervention-{side} run: {message}"),
        None => format!("harness failure on the intervention-{side} run"),
    }
}
