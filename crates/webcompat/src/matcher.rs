//! Decides whether a probe is runnable in the current environment.
//!
//! Matching happens before any browser session exists, so a skip here
//! costs nothing. Rules are evaluated in a fixed order and the first
//! one that trips names the skip reason.

use crate::environment::EnvironmentProfile;
use crate::probe::{Capability, ProbeMetadata};
use crate::result::SkipReason;

/// Outcome of matching one probe against the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision {
    /// The probe applies here; hand it to the engine.
    Runnable,
    /// The probe cannot produce a meaningful verdict here.
    Skip(SkipReason),
}

impl MatchDecision {
    /// Whether the probe should run.
    #[must_use]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, Self::Runnable)
    }
}

/// Evaluates probe metadata against one environment profile.
///
/// Rule order: platform allow-list, platform deny-list, version bounds,
/// required capabilities, credentials. First match wins.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityMatcher<'a> {
    profile: &'a EnvironmentProfile,
}

impl<'a> CapabilityMatcher<'a> {
    /// Create a matcher for the given environment.
    #[must_use]
    pub const fn new(profile: &'a EnvironmentProfile) -> Self {
        Self { profile }
    }

    /// Decide whether the probe is runnable here.
    #[must_use]
    pub fn evaluate(&self, metadata: &ProbeMetadata) -> MatchDecision {
        let platform = self.profile.platform();

        if !metadata.only_platforms.is_empty() && !metadata.only_platforms.contains(&platform) {
            let allowed = metadata
                .only_platforms
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return skip_env(format!("runs only on {allowed}, not {platform}"));
        }

        if metadata.skip_platforms.contains(&platform) {
            return skip_env(format!("excluded on {platform}"));
        }

        if !metadata.version_allowed(self.profile.firefox_major()) {
            return skip_env(format!(
                "needs Firefox {}, running {}",
                bounds_description(metadata.min_version, metadata.max_version),
                self.profile.firefox_major()
            ));
        }

        for capability in &metadata.requires {
            let satisfied = match capability {
                Capability::VisibleScrollbars => self.profile.visible_scrollbars(),
                Capability::PhysicalDevice => self.profile.physical_device(),
            };
            if !satisfied {
                return skip_env(format!("requires {}", capability.as_str()));
            }
        }

        if let Some(site) = &metadata.credentials_site {
            if self.profile.credentials().get(site).is_none() {
                return skip_env(format!("no credentials configured for {site}"));
            }
        }

        // `headed_only` is not a matching rule. Whether headless breaks a
        // probe depends on which flow the page takes, so the body raises
        // that skip at the step that needs a headed browser.

        MatchDecision::Runnable
    }
}

fn skip_env(reason: impl Into<String>) -> MatchDecision {
    MatchDecision::Skip(SkipReason::Environment(reason.into()))
}

fn bounds_description(min: Option<u32>, max: Option<u32>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{min}..={max}"),
        (Some(min), None) => format!("{min} or later"),
        (None, Some(max)) => format!("{max} or earlier"),
        (None, None) => "any version".to_string(),
    }
}
