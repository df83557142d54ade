//! Run reports: JSON records plus a JUnit artifact for CI.
//!
//! Each probe contributes one self-contained record carrying the
//! verdict and both outcomes, so report consumers can see why a verdict
//! was reached without rerunning anything. The JUnit rendering maps the
//! verdict taxonomy onto CI semantics: only the regression verdicts
//! fail the suite, skips become skipped testcases, and harness trouble
//! becomes errors.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::ProbeReport;
use crate::environment::{EnvironmentProfile, Platform};
use crate::outcome::{RunOutcome, Verdict};
use crate::result::WebcompatResult;

// =============================================================================
// PROBE RECORD
// =============================================================================

/// One probe's row in the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// Probe id.
    pub id: String,
    /// Page the probe exercised.
    pub url: String,
    /// Tracked bug, when the probe names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug: Option<u64>,
    /// Platform tag of the run.
    pub platform: Platform,
    /// Firefox major version of the run profile.
    pub version: u32,
    /// Verdict for the pair.
    pub verdict: Verdict,
    /// One-line explanation of the verdict.
    pub explanation: String,
    /// Outcome with the intervention enabled.
    pub with_outcome: RunOutcome,
    /// Outcome with the intervention disabled; absent when the pair was
    /// aborted after the first side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub without_outcome: Option<RunOutcome>,
}

impl ProbeRecord {
    /// Flatten one engine report into a record.
    #[must_use]
    pub fn new(report: ProbeReport, environment: &EnvironmentProfile) -> Self {
        Self {
            id: report.metadata.id,
            url: report.metadata.url,
            bug: report.metadata.bug,
            platform: environment.platform(),
            version: environment.firefox_major(),
            verdict: report.verdict.verdict,
            explanation: report.verdict.explanation,
            with_outcome: report.verdict.with_outcome,
            without_outcome: report.verdict.without_outcome,
        }
    }

    /// Wall-clock spent on both sides, in seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        let without = self
            .without_outcome
            .as_ref()
            .map_or(0, |outcome| outcome.elapsed_ms);
        (self.with_outcome.elapsed_ms + without) as f64 / 1000.0
    }

    /// Multi-line evidence block for failure bodies.
    fn evidence(&self) -> String {
        let mut lines = vec![format!("url: {}", self.url)];
        lines.push(format!(
            "with intervention: {}",
            describe_outcome(&self.with_outcome)
        ));
        match &self.without_outcome {
            Some(outcome) => lines.push(format!(
                "without intervention: {}",
                describe_outcome(outcome)
            )),
            None => lines.push("without intervention: not run".to_string()),
        }
        lines.join("\n")
    }
}

fn describe_outcome(outcome: &RunOutcome) -> String {
    let status = outcome.status.as_str();
    match outcome.diagnostics.message.as_deref() {
        Some(message) => format!("{status} ({message})"),
        None => status.to_string(),
    }
}

// =============================================================================
// SUMMARY
// =============================================================================

/// Verdict counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Probes in the run.
    pub total: usize,
    /// `workaround-still-needed` verdicts.
    pub still_needed: usize,
    /// `workaround-obsolete` verdicts.
    pub obsolete: usize,
    /// `unexpected-both-sides-fail` verdicts.
    pub both_sides_fail: usize,
    /// `unexpected-inversion` verdicts.
    pub inversions: usize,
    /// `skipped` verdicts.
    pub skipped: usize,
    /// `infrastructure-error` verdicts.
    pub infrastructure_errors: usize,
}

impl RunSummary {
    /// Tally the verdicts of a record list.
    #[must_use]
    pub fn count(records: &[ProbeRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.verdict {
                Verdict::WorkaroundStillNeeded => summary.still_needed += 1,
                Verdict::WorkaroundObsolete => summary.obsolete += 1,
                Verdict::UnexpectedBothSidesFail => summary.both_sides_fail += 1,
                Verdict::UnexpectedInversion => summary.inversions += 1,
                Verdict::Skipped => summary.skipped += 1,
                Verdict::InfrastructureError => summary.infrastructure_errors += 1,
            }
        }
        summary
    }

    /// Probes whose verdict demands intervention maintenance.
    #[must_use]
    pub const fn regressions(&self) -> usize {
        self.obsolete + self.inversions
    }

    /// Whether the run should exit zero.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.regressions() == 0
    }
}

// =============================================================================
// RUN REPORT
// =============================================================================

/// A complete run: header, verdict counts, and per-probe records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Correlation id for this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Platform the probes were matched against.
    pub platform: Platform,
    /// Firefox major version of the run profile.
    pub firefox_major: u32,
    /// Whether the browser ran headless.
    pub headless: bool,
    /// Verdict counts.
    pub summary: RunSummary,
    /// One record per probe, in run order.
    pub records: Vec<ProbeRecord>,
}

impl RunReport {
    /// Assemble a report from engine output.
    #[must_use]
    pub fn assemble(
        environment: &EnvironmentProfile,
        started_at: DateTime<Utc>,
        reports: Vec<ProbeReport>,
    ) -> Self {
        let records: Vec<ProbeRecord> = reports
            .into_iter()
            .map(|report| ProbeRecord::new(report, environment))
            .collect();
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            platform: environment.platform(),
            firefox_major: environment.firefox_major(),
            headless: environment.headless(),
            summary: RunSummary::count(&records),
            records,
        }
    }

    /// Whether the run should exit zero: no probe reported
    /// `workaround-obsolete` or `unexpected-inversion`.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.summary.is_clean()
    }

    /// Render the JSON artifact.
    pub fn render_json(&self) -> WebcompatResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render the JUnit XML artifact.
    #[must_use]
    pub fn render_junit(&self) -> String {
        let total_secs: f64 = self.records.iter().map(ProbeRecord::elapsed_secs).sum();
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<testsuite name="webcompat-{}" tests="{}" failures="{}" errors="{}" skipped="{}" timestamp="{}" time="{:.3}">"#,
            self.platform,
            self.summary.total,
            self.summary.regressions(),
            self.summary.infrastructure_errors,
            self.summary.skipped,
            self.started_at.to_rfc3339(),
            total_secs,
        ));
        xml.push('\n');

        for record in &self.records {
            xml.push_str(&format!(
                r#"  <testcase name="{}" classname="webcompat.{}" time="{:.3}">"#,
                escape_xml(&record.id),
                self.platform,
                record.elapsed_secs(),
            ));
            xml.push('\n');
            match record.verdict {
                Verdict::WorkaroundObsolete | Verdict::UnexpectedInversion => {
                    xml.push_str(&format!(
                        "    <failure message=\"{}\">{}</failure>\n",
                        escape_xml(&record.explanation),
                        escape_xml(&record.evidence()),
                    ));
                }
                Verdict::Skipped => {
                    xml.push_str(&format!(
                        "    <skipped message=\"{}\"/>\n",
                        escape_xml(&record.explanation),
                    ));
                }
                Verdict::InfrastructureError => {
                    xml.push_str(&format!(
                        "    <error message=\"{}\"/>\n",
                        escape_xml(&record.explanation),
                    ));
                }
                Verdict::WorkaroundStillNeeded | Verdict::UnexpectedBothSidesFail => {}
            }
            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }

    /// Write the JSON artifact.
    pub fn write_json(&self, path: &Path) -> WebcompatResult<()> {
        std::fs::write(path, self.render_json()?)?;
        Ok(())
    }

    /// Write the JUnit XML artifact.
    pub fn write_junit(&self, path: &Path) -> WebcompatResult<()> {
        std::fs::write(path, self.render_junit())?;
        Ok(())
    }
}

/// Escape XML special characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
