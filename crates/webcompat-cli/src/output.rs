//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use webcompat::{ProbeCompleted, RunSummary, Verdict};

/// Progress reporter for fleet execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over the fleet
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Finish the progress bar
    pub fn finish_progress(&mut self) {
        if let Some(pb) = self.progress_bar.take() {
            pb.finish_and_clear();
        }
    }

    /// Print one probe's verdict line and advance the bar.
    ///
    /// Regressions print even in quiet mode; everything else is
    /// suppressed there.
    pub fn probe_finished(&self, event: &ProbeCompleted) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
        if self.quiet && !event.verdict.is_regression() {
            return;
        }

        let prefix = self.verdict_prefix(event.verdict);
        let line = format!("{prefix} {} {}: {}", event.id, event.verdict, event.explanation);
        self.write_line(&line);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };

        self.write_line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        self.write_line(&format!("{prefix} {message}"));
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.write_line("");
        self.write_line(&styled);
    }

    /// Print the run summary
    pub fn summary(&self, summary: &RunSummary, duration: Duration) {
        if self.quiet && summary.is_clean() {
            return;
        }

        self.write_line("");

        let duration_secs = duration.as_secs_f64();
        let counts = format!(
            "{} still needed, {} obsolete, {} inverted, {} both sides broken, {} skipped, {} infra errors",
            summary.still_needed,
            summary.obsolete,
            summary.inversions,
            summary.both_sides_fail,
            summary.skipped,
            summary.infrastructure_errors
        );

        if self.use_color {
            let status = if summary.is_clean() {
                Style::new().green().bold().apply_to("CLEAN")
            } else {
                Style::new().red().bold().apply_to("REGRESSIONS")
            };
            self.write_line(&format!(
                "{} {} probes in {:.1}s ({counts})",
                status, summary.total, duration_secs
            ));
        } else {
            let status = if summary.is_clean() {
                "CLEAN"
            } else {
                "REGRESSIONS"
            };
            self.write_line(&format!(
                "{status} {} probes in {duration_secs:.1}s ({counts})",
                summary.total
            ));
        }
    }

    fn verdict_prefix(&self, verdict: Verdict) -> String {
        if self.use_color {
            match verdict {
                Verdict::WorkaroundStillNeeded => style("✓").green().bold().to_string(),
                Verdict::WorkaroundObsolete | Verdict::UnexpectedInversion => {
                    style("✗").red().bold().to_string()
                }
                Verdict::UnexpectedBothSidesFail | Verdict::InfrastructureError => {
                    style("⚠").yellow().bold().to_string()
                }
                Verdict::Skipped => style("-").dim().to_string(),
            }
        } else {
            plain_label(verdict).to_string()
        }
    }

    /// Lines route through the bar when one is active so it stays at the
    /// bottom of the terminal.
    fn write_line(&self, line: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.println(line);
        } else {
            let _ = self.term.write_line(line);
        }
    }
}

const fn plain_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::WorkaroundStillNeeded => "OK",
        Verdict::WorkaroundObsolete => "OBSOLETE",
        Verdict::UnexpectedInversion => "INVERTED",
        Verdict::UnexpectedBothSidesFail => "BROKEN",
        Verdict::Skipped => "SKIP",
        Verdict::InfrastructureError => "INFRA",
    }
}
