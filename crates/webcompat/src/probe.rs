//! Probe definitions: metadata, step schema, and the YAML loader.
//!
//! A probe is a small declarative script with two bodies, one run with
//! the site intervention enabled and one with it disabled. Bodies are
//! data, not code: loading a probe never talks to a browser.
//!
//! ```yaml
//! id: "1234_example_com"
//! bug: 1234
//! url: "https://example.com/login"
//! only_platforms: [android]
//! disabled:
//!   - type: navigate
//!   - type: await_css
//!     selector: "#password"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::BrowserContext;
use crate::environment::Platform;
use crate::locator::Locator;
use crate::wait::{NavigationWait, DEFAULT_PROBE_TIMEOUT_SECS};

// =============================================================================
// ERRORS
// =============================================================================

/// Why a probe file was rejected by the loader.
#[derive(Debug, thiserror::Error)]
pub enum ProbeParseError {
    /// The YAML itself did not deserialize.
    #[error("invalid probe YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// The `id` field is empty.
    #[error("probe id must not be empty")]
    EmptyId,

    /// The `url` field is empty.
    #[error("probe `{id}` has an empty url")]
    EmptyUrl {
        /// Offending probe.
        id: String,
    },

    /// Neither `enabled`, `disabled`, nor `regression` is present.
    #[error("probe `{id}` defines no body (need `enabled`, `disabled`, or `regression`)")]
    MissingBody {
        /// Offending probe.
        id: String,
    },

    /// A regression body without a version bound would shadow the
    /// disabled body forever.
    #[error("probe `{id}` has a regression body without `min_version` or `max_version`")]
    RegressionWithoutBound {
        /// Offending probe.
        id: String,
    },

    /// Two probe files claim the same id.
    #[error("duplicate probe id `{id}` (second definition in {path})")]
    DuplicateId {
        /// The contested id.
        id: String,
        /// File holding the second definition.
        path: String,
    },

    /// A step failed structural validation.
    #[error("probe `{id}`: {message}")]
    InvalidStep {
        /// Offending probe.
        id: String,
        /// What is wrong with the step.
        message: String,
    },

    /// A probe file was rejected; names the file for the operator.
    #[error("{path}: {source}")]
    File {
        /// Offending file.
        path: String,
        /// What was wrong with it.
        #[source]
        source: Box<ProbeParseError>,
    },
}

impl ProbeParseError {
    /// Attach the file path the error came from.
    #[must_use]
    pub fn in_file(self, path: impl Into<String>) -> Self {
        Self::File {
            path: path.into(),
            source: Box::new(self),
        }
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// Environment capability a probe can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Classic scrollbars that take up layout space.
    VisibleScrollbars,
    /// A real device rather than an emulator.
    PhysicalDevice,
}

impl Capability {
    /// Capability string used in skip messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VisibleScrollbars => "visible-scrollbars",
            Self::PhysicalDevice => "physical-device",
        }
    }
}

/// Declarative gating and identity of a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeMetadata {
    /// Unique id, conventionally `<bug>_<host>`.
    pub id: String,
    /// Bugzilla bug the intervention tracks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug: Option<u64>,
    /// Page the probe exercises.
    pub url: String,
    /// Run only on these platforms. Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub only_platforms: Vec<Platform>,
    /// Never run on these platforms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_platforms: Vec<Platform>,
    /// Lowest Firefox major version the probe applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<u32>,
    /// Highest Firefox major version the probe applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<u32>,
    /// Environment capabilities the probe needs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Capability>,
    /// The probed behavior only reproduces in a headed browser. The
    /// matcher does not act on this; the body raises the skip at the
    /// step that needs a headed browser.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub headed_only: bool,
    /// Per-probe deadline override, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Key into the ambient credential store, for probes behind a login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_site: Option<String>,
    /// Free-form maintainer notes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl ProbeMetadata {
    /// Whether the given Firefox major version falls inside this probe's
    /// version bounds.
    #[must_use]
    pub fn version_allowed(&self, firefox_major: u32) -> bool {
        version_within(self.min_version, self.max_version, firefox_major)
    }

    /// Deadline for one body run.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS))
    }
}

/// Whether `version` lies inside the inclusive `[min, max]` bounds.
/// A missing bound is open on that side.
#[must_use]
pub fn version_within(min: Option<u32>, max: Option<u32>, version: u32) -> bool {
    min.map_or(true, |m| version >= m) && max.map_or(true, |m| version <= m)
}

// =============================================================================
// STEPS
// =============================================================================

/// Which half of a stored credential to type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialField {
    /// The account name.
    User,
    /// The account password.
    Password,
}

/// What to do when a particular locator wins an `await_first_of` race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ArmAction {
    /// Proceed with the remaining steps.
    Continue,
    /// The site showed the probed breakage.
    Fail {
        /// Explanation recorded in the outcome.
        message: String,
    },
    /// The site is gated by geography here.
    SkipRegion {
        /// Explanation recorded in the outcome.
        reason: String,
    },
    /// The site's own infrastructure is refusing service.
    SkipInfrastructure {
        /// Explanation recorded in the outcome.
        reason: String,
    },
}

/// Binds one `await_first_of` locator, by position, to an action.
/// Unmapped winners continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    /// Position of the locator in the race list.
    pub index: usize,
    /// What winning means for the run.
    pub then: ArmAction,
}

fn default_true() -> bool {
    true
}

/// One instruction in a probe body.
///
/// Steps with a `trigger` list arm their listener first, then run the
/// trigger steps, then wait. Waits ship a default timeout; `timeout_ms`
/// overrides it per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Load a page. Without `url` the probe's own url is used.
    Navigate {
        /// Absolute url to load.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Readiness to wait for before continuing.
        #[serde(default)]
        wait: NavigationWait,
        /// Navigation deadline override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Also wait for this console substring after the load.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect_console_message: Option<String>,
    },
    /// Wait for an element matching a CSS selector.
    AwaitCss {
        /// CSS selector.
        selector: String,
        /// Additionally require the element to be displayed (or hidden).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        displayed: Option<bool>,
        /// Wait deadline override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Wait for an element containing the given text.
    AwaitText {
        /// Text to look for.
        text: String,
        /// Additionally require the element to be displayed (or hidden).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        displayed: Option<bool>,
        /// Wait deadline override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Race several locators; the first to appear decides what happens
    /// next via `on_match`.
    AwaitFirstOf {
        /// Locators to race.
        locators: Vec<Locator>,
        /// Wait deadline override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Actions keyed by winning locator position.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        on_match: Vec<MatchArm>,
    },
    /// Wait for a matching element to disappear or become invisible.
    AwaitHidden {
        /// CSS selector.
        selector: String,
        /// Wait deadline override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Assert an element exists right now, without waiting.
    ExpectPresent {
        /// CSS selector.
        selector: String,
    },
    /// Assert no element matches right now, without waiting.
    ExpectAbsent {
        /// CSS selector.
        selector: String,
    },
    /// Click an element, dismissing listed popup selectors if they
    /// intercept the click.
    Click {
        /// CSS selector.
        selector: String,
        /// Selectors of overlays that may swallow the first click.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        popups: Vec<String>,
    },
    /// Click an element, ignoring interception.
    SoftClick {
        /// CSS selector.
        selector: String,
    },
    /// Flick-scroll an element with synthesized touch input, driving the
    /// async pan/zoom path rather than `scrollTo`.
    ApzScroll {
        /// CSS selector of the element to flick on.
        selector: String,
        /// Horizontal distance in CSS pixels, positive scrolls right.
        #[serde(default)]
        dx: i64,
        /// Vertical distance in CSS pixels, positive scrolls down.
        #[serde(default)]
        dy: i64,
    },
    /// Tap an element with synthesized touch input.
    ApzClick {
        /// CSS selector.
        selector: String,
    },
    /// Press a named keyboard key ("Enter", "Tab", "Escape", ...).
    KeyPress {
        /// Key name.
        key: String,
    },
    /// Click an input and type literal text into it.
    EnterText {
        /// CSS selector of the input.
        selector: String,
        /// Text to type.
        text: String,
    },
    /// Type one half of the probe's stored credential into an input.
    /// The value never appears in probe files or reports.
    EnterCredential {
        /// CSS selector of the input.
        selector: String,
        /// Which half to type.
        field: CredentialField,
    },
    /// Resize the window to given CSS pixel dimensions.
    SetScreenSize {
        /// Width in CSS pixels.
        width: u32,
        /// Height in CSS pixels.
        height: u32,
    },
    /// Enter the iframe matching a selector. Navigation resets the
    /// frame to the top document.
    SwitchToFrame {
        /// CSS selector of the iframe.
        selector: String,
    },
    /// Run nested steps in the chrome or content context.
    UsingContext {
        /// Context to run in.
        context: BrowserContext,
        /// Steps to run inside it.
        steps: Vec<Step>,
    },
    /// Register a script to run in every document before its own
    /// scripts, surviving navigation.
    PreloadScript {
        /// JavaScript source.
        source: String,
    },
    /// Neutralize `alert`, `confirm`, and `prompt` for subsequent
    /// navigations.
    DisableAlerts,
    /// Arm a console listener, run the trigger steps, then wait for a
    /// console message containing the substring.
    AwaitConsoleMessage {
        /// Substring to match.
        substring: String,
        /// Wait deadline override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Steps expected to provoke the message.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        trigger: Vec<Step>,
    },
    /// Arm a navigation listener, run the trigger steps, then wait for
    /// a navigation whose url contains the substring.
    AwaitNavigationBegins {
        /// Substring of the destination url.
        url_substring: String,
        /// Wait deadline override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Steps expected to provoke the navigation.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        trigger: Vec<Step>,
    },
    /// Arm an alert listener, run the trigger steps, then wait for a
    /// user prompt, optionally matching its text.
    AwaitAlert {
        /// Substring the prompt text must contain.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        substring: Option<String>,
        /// Wait deadline override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// Steps expected to provoke the prompt.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        trigger: Vec<Step>,
    },
    /// Unconditional pause. A last resort for sites whose breakage has
    /// no observable completion signal.
    Sleep {
        /// Pause length in milliseconds.
        ms: u64,
    },
    /// Skip the probe at runtime when the browser is headless.
    SkipIfHeadless {
        /// Why headless cannot reproduce the behavior.
        reason: String,
    },
    /// Scroll an element into view with plain DOM scrolling.
    ScrollIntoView {
        /// CSS selector.
        selector: String,
    },
    /// Hide all elements matching a selector (visual noise removal
    /// before screenshots).
    HideElements {
        /// CSS selector.
        selector: String,
    },
    /// Remove the first element matching a selector from the DOM.
    RemoveElement {
        /// CSS selector.
        selector: String,
    },
    /// Assert an attribute value on an element.
    ExpectAttribute {
        /// CSS selector.
        selector: String,
        /// Attribute name.
        name: String,
        /// Exact value required.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        equals: Option<String>,
        /// Substring the value must contain.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contains: Option<String>,
    },
    /// Screenshot an element and test whether it renders as one solid
    /// color (blank video areas, covered content).
    IsOneSolidColor {
        /// CSS selector.
        selector: String,
        /// Whether solid is the working state.
        #[serde(default = "default_true")]
        expect: bool,
    },
    /// Install the tap marker the fastclick check reads. Must precede
    /// the navigation it observes.
    PrimeFastclick,
    /// Tap an element and check whether the fastclick library delivered
    /// the tap to the page.
    TestForFastclick {
        /// CSS selector of the tap target.
        selector: String,
        /// Whether fastclick interference is expected here, for
        /// diagnostics phrasing.
        #[serde(default = "default_true")]
        expect_active: bool,
    },
    /// Check that the promotional banner on an Entrata property portal
    /// is kept off-screen.
    TestEntrataBannerHidden {
        /// Whether hidden is expected here, for diagnostics phrasing.
        #[serde(default = "default_true")]
        expect_hidden: bool,
    },
    /// Navigate a nicochannel-family video page and check playback
    /// starts without a decode error.
    TestNicochannelLikeSite {
        /// Page with an autoplaying video.
        url: String,
        /// Whether playback is expected here, for diagnostics phrasing.
        #[serde(default = "default_true")]
        should_pass: bool,
    },
    /// Check the trending list for a layout-breaking horizontal
    /// scrollbar.
    TestTrendingScrollbar {
        /// Whether the scrollbar is expected here, for diagnostics
        /// phrasing.
        #[serde(default)]
        should_fail: bool,
    },
}

// =============================================================================
// PROBE
// =============================================================================

/// Alternative disabled-side body for Firefox versions where the site
/// regressed in a different way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionBody {
    /// Lowest Firefox major version the regression affects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<u32>,
    /// Highest Firefox major version the regression affects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<u32>,
    /// Replacement steps for the disabled side.
    pub steps: Vec<Step>,
}

impl RegressionBody {
    /// Whether this body replaces the disabled body on the given
    /// Firefox major version.
    #[must_use]
    pub fn applies_to(&self, firefox_major: u32) -> bool {
        version_within(self.min_version, self.max_version, firefox_major)
    }
}

/// A complete probe definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    /// Gating and identity.
    #[serde(flatten)]
    pub metadata: ProbeMetadata,
    /// Body run with the intervention enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<Step>>,
    /// Body run with the intervention disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<Vec<Step>>,
    /// Version-bounded replacement for the disabled body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionBody>,
}

impl Probe {
    /// Parse a probe from YAML and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ProbeParseError> {
        let probe: Self = serde_yaml_ng::from_str(yaml)?;
        probe.validate()?;
        Ok(probe)
    }

    /// Start building a probe in code.
    #[must_use]
    pub fn builder(id: impl Into<String>, url: impl Into<String>) -> ProbeBuilder {
        ProbeBuilder::new(id, url)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ProbeParseError> {
        if self.metadata.id.trim().is_empty() {
            return Err(ProbeParseError::EmptyId);
        }
        if self.metadata.url.trim().is_empty() {
            return Err(ProbeParseError::EmptyUrl {
                id: self.metadata.id.clone(),
            });
        }
        if self.enabled.is_none() && self.disabled.is_none() && self.regression.is_none() {
            return Err(ProbeParseError::MissingBody {
                id: self.metadata.id.clone(),
            });
        }
        if let Some(regression) = &self.regression {
            if regression.min_version.is_none() && regression.max_version.is_none() {
                return Err(ProbeParseError::RegressionWithoutBound {
                    id: self.metadata.id.clone(),
                });
            }
            self.validate_steps(&regression.steps)?;
        }
        if let Some(steps) = &self.enabled {
            self.validate_steps(steps)?;
        }
        if let Some(steps) = &self.disabled {
            self.validate_steps(steps)?;
        }
        Ok(())
    }

    fn validate_steps(&self, steps: &[Step]) -> Result<(), ProbeParseError> {
        for step in steps {
            match step {
                Step::AwaitFirstOf {
                    locators, on_match, ..
                } => {
                    if locators.is_empty() {
                        return Err(self.invalid_step("await_first_of needs at least one locator"));
                    }
                    for arm in on_match {
                        if arm.index >= locators.len() {
                            return Err(self.invalid_step(format!(
                                "await_first_of arm index {} out of range (have {} locators)",
                                arm.index,
                                locators.len()
                            )));
                        }
                    }
                }
                Step::EnterCredential { .. } => {
                    if self.metadata.credentials_site.is_none() {
                        return Err(self.invalid_step(
                            "enter_credential requires `credentials_site` in the metadata",
                        ));
                    }
                }
                Step::ExpectAttribute {
                    equals, contains, ..
                } => {
                    if equals.is_none() && contains.is_none() {
                        return Err(
                            self.invalid_step("expect_attribute needs `equals` or `contains`")
                        );
                    }
                }
                Step::UsingContext { steps, .. } => self.validate_steps(steps)?,
                Step::AwaitConsoleMessage { trigger, .. }
                | Step::AwaitNavigationBegins { trigger, .. }
                | Step::AwaitAlert { trigger, .. } => self.validate_steps(trigger)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn invalid_step(&self, message: impl Into<String>) -> ProbeParseError {
        ProbeParseError::InvalidStep {
            id: self.metadata.id.clone(),
            message: message.into(),
        }
    }

    /// Steps for the enabled side. Single-sided probes run their lone
    /// body on both sides.
    #[must_use]
    pub fn enabled_steps(&self) -> &[Step] {
        self.enabled
            .as_deref()
            .or(self.disabled.as_deref())
            .unwrap_or_else(|| self.regression.as_ref().map_or(&[], |r| &r.steps))
    }

    /// Steps for the disabled side on the given Firefox version. A
    /// regression body whose bounds cover the version takes precedence.
    #[must_use]
    pub fn disabled_steps(&self, firefox_major: u32) -> &[Step] {
        if let Some(regression) = &self.regression {
            if regression.applies_to(firefox_major) {
                return &regression.steps;
            }
        }
        self.disabled
            .as_deref()
            .or(self.enabled.as_deref())
            .unwrap_or_else(|| self.regression.as_ref().map_or(&[], |r| &r.steps))
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// In-code probe construction, mostly for tests and fixtures.
#[derive(Debug, Clone)]
pub struct ProbeBuilder {
    probe: Probe,
}

impl ProbeBuilder {
    /// Create a builder with the two mandatory fields.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            probe: Probe {
                metadata: ProbeMetadata {
                    id: id.into(),
                    bug: None,
                    url: url.into(),
                    only_platforms: Vec::new(),
                    skip_platforms: Vec::new(),
                    min_version: None,
                    max_version: None,
                    requires: Vec::new(),
                    headed_only: false,
                    timeout_secs: None,
                    credentials_site: None,
                    notes: String::new(),
                },
                enabled: None,
                disabled: None,
                regression: None,
            },
        }
    }

    /// Set the tracked bug number.
    #[must_use]
    pub fn bug(mut self, bug: u64) -> Self {
        self.probe.metadata.bug = Some(bug);
        self
    }

    /// Restrict the probe to the given platforms.
    #[must_use]
    pub fn only_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.probe.metadata.only_platforms = platforms.into_iter().collect();
        self
    }

    /// Exclude the given platforms.
    #[must_use]
    pub fn skip_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.probe.metadata.skip_platforms = platforms.into_iter().collect();
        self
    }

    /// Set the lowest applicable Firefox major version.
    #[must_use]
    pub fn min_version(mut self, version: u32) -> Self {
        self.probe.metadata.min_version = Some(version);
        self
    }

    /// Set the highest applicable Firefox major version.
    #[must_use]
    pub fn max_version(mut self, version: u32) -> Self {
        self.probe.metadata.max_version = Some(version);
        self
    }

    /// Require an environment capability.
    #[must_use]
    pub fn requires(mut self, capability: Capability) -> Self {
        self.probe.metadata.requires.push(capability);
        self
    }

    /// Mark the probe as headed-only.
    #[must_use]
    pub fn headed_only(mut self) -> Self {
        self.probe.metadata.headed_only = true;
        self
    }

    /// Override the per-body deadline.
    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.probe.metadata.timeout_secs = Some(secs);
        self
    }

    /// Name the credential store entry the probe needs.
    #[must_use]
    pub fn credentials_site(mut self, site: impl Into<String>) -> Self {
        self.probe.metadata.credentials_site = Some(site.into());
        self
    }

    /// Attach maintainer notes.
    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.probe.metadata.notes = notes.into();
        self
    }

    /// Set the enabled-side body.
    #[must_use]
    pub fn enabled(mut self, steps: Vec<Step>) -> Self {
        self.probe.enabled = Some(steps);
        self
    }

    /// Set the disabled-side body.
    #[must_use]
    pub fn disabled(mut self, steps: Vec<Step>) -> Self {
        self.probe.disabled = Some(steps);
        self
    }

    /// Attach a version-bounded regression body.
    #[must_use]
    pub fn regression(
        mut self,
        min_version: Option<u32>,
        max_version: Option<u32>,
        steps: Vec<Step>,
    ) -> Self {
        self.probe.regression = Some(RegressionBody {
            min_version,
            max_version,
            steps,
        });
        self
    }

    /// Validate and produce the probe.
    pub fn build(self) -> Result<Probe, ProbeParseError> {
        self.probe.validate()?;
        Ok(self.probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigate() -> Step {
        Step::Navigate {
            url: None,
            wait: NavigationWait::default(),
            timeout_ms: None,
            expect_console_message: None,
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_minimal_probe() {
            let probe = Probe::from_yaml(
                r"
id: 1234_example_com
url: https://example.com/
disabled:
  - type: navigate
  - type: await_css
    selector: '#login'
",
            )
            .unwrap();
            assert_eq!(probe.metadata.id, "1234_example_com");
            assert!(probe.metadata.bug.is_none());
            assert!(probe.enabled.is_none());
            assert_eq!(probe.disabled.as_ref().unwrap().len(), 2);
        }

        #[test]
        fn test_full_metadata() {
            let probe = Probe::from_yaml(
                r"
id: 1448747_mobilesuica
bug: 1448747
url: https://www.mobilesuica.com/
only_platforms: [android]
skip_platforms: [windows]
min_version: 120
requires: [visible-scrollbars]
headed_only: true
timeout_secs: 90
credentials_site: mobilesuica.com
notes: JR East login portal
disabled:
  - type: navigate
",
            )
            .unwrap();
            assert_eq!(probe.metadata.bug, Some(1_448_747));
            assert_eq!(probe.metadata.only_platforms, vec![Platform::Android]);
            assert_eq!(probe.metadata.skip_platforms, vec![Platform::Windows]);
            assert_eq!(probe.metadata.min_version, Some(120));
            assert_eq!(
                probe.metadata.requires,
                vec![Capability::VisibleScrollbars]
            );
            assert!(probe.metadata.headed_only);
            assert_eq!(probe.metadata.timeout(), Duration::from_secs(90));
            assert_eq!(
                probe.metadata.credentials_site.as_deref(),
                Some("mobilesuica.com")
            );
        }

        #[test]
        fn test_await_first_of_with_arms() {
            let probe = Probe::from_yaml(
                r"
id: race
url: https://example.com/
disabled:
  - type: await_first_of
    locators:
      - css: '#password'
      - text: 'not supported'
    on_match:
      - index: 1
        then:
          action: fail
          message: unsupported-browser interstitial shown
",
            )
            .unwrap();
            let Step::AwaitFirstOf {
                locators, on_match, ..
            } = &probe.disabled.as_ref().unwrap()[0]
            else {
                panic!("expected await_first_of");
            };
            assert_eq!(locators.len(), 2);
            assert_eq!(on_match.len(), 1);
            assert_eq!(on_match[0].index, 1);
            assert!(matches!(on_match[0].then, ArmAction::Fail { .. }));
        }

        #[test]
        fn test_trigger_steps_nest() {
            let probe = Probe::from_yaml(
                r"
id: nested
url: https://example.com/
enabled:
  - type: await_console_message
    substring: player ready
    trigger:
      - type: click
        selector: '#play'
",
            )
            .unwrap();
            let Step::AwaitConsoleMessage { trigger, .. } = &probe.enabled.as_ref().unwrap()[0]
            else {
                panic!("expected await_console_message");
            };
            assert_eq!(trigger.len(), 1);
        }

        #[test]
        fn test_unknown_step_type_is_rejected() {
            let err = Probe::from_yaml(
                r"
id: bad
url: https://example.com/
disabled:
  - type: frobnicate
",
            )
            .unwrap_err();
            assert!(matches!(err, ProbeParseError::Yaml(_)));
        }

        #[test]
        fn test_round_trip() {
            let probe = Probe::builder("rt", "https://example.com/")
                .disabled(vec![
                    navigate(),
                    Step::AwaitCss {
                        selector: "#x".into(),
                        displayed: Some(true),
                        timeout_ms: Some(5000),
                    },
                ])
                .build()
                .unwrap();
            let yaml = serde_yaml_ng::to_string(&probe).unwrap();
            let back = Probe::from_yaml(&yaml).unwrap();
            assert_eq!(back, probe);
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn test_empty_id_rejected() {
            let err = Probe::builder("  ", "https://example.com/")
                .disabled(vec![navigate()])
                .build()
                .unwrap_err();
            assert!(matches!(err, ProbeParseError::EmptyId));
        }

        #[test]
        fn test_empty_url_rejected() {
            let err = Probe::builder("x", "")
                .disabled(vec![navigate()])
                .build()
                .unwrap_err();
            assert!(matches!(err, ProbeParseError::EmptyUrl { .. }));
        }

        #[test]
        fn test_missing_body_rejected() {
            let err = Probe::builder("x", "https://example.com/")
                .build()
                .unwrap_err();
            assert!(matches!(err, ProbeParseError::MissingBody { .. }));
        }

        #[test]
        fn test_regression_without_bound_rejected() {
            let err = Probe::builder("x", "https://example.com/")
                .regression(None, None, vec![navigate()])
                .build()
                .unwrap_err();
            assert!(matches!(err, ProbeParseError::RegressionWithoutBound { .. }));
        }

        #[test]
        fn test_arm_index_out_of_range_rejected() {
            let err = Probe::builder("x", "https://example.com/")
                .disabled(vec![Step::AwaitFirstOf {
                    locators: vec![Locator::css("#a")],
                    timeout_ms: None,
                    on_match: vec![MatchArm {
                        index: 1,
                        then: ArmAction::Continue,
                    }],
                }])
                .build()
                .unwrap_err();
            assert!(matches!(err, ProbeParseError::InvalidStep { .. }));
        }

        #[test]
        fn test_credential_step_needs_site() {
            let err = Probe::builder("x", "https://example.com/")
                .disabled(vec![Step::EnterCredential {
                    selector: "#user".into(),
                    field: CredentialField::User,
                }])
                .build()
                .unwrap_err();
            assert!(matches!(err, ProbeParseError::InvalidStep { .. }));
        }

        #[test]
        fn test_nested_steps_are_validated() {
            let err = Probe::builder("x", "https://example.com/")
                .disabled(vec![Step::UsingContext {
                    context: BrowserContext::Chrome,
                    steps: vec![Step::ExpectAttribute {
                        selector: "#x".into(),
                        name: "class".into(),
                        equals: None,
                        contains: None,
                    }],
                }])
                .build()
                .unwrap_err();
            assert!(matches!(err, ProbeParseError::InvalidStep { .. }));
        }
    }

    mod body_selection_tests {
        use super::*;

        #[test]
        fn test_single_sided_probe_shares_its_body() {
            let probe = Probe::builder("x", "https://example.com/")
                .disabled(vec![navigate()])
                .build()
                .unwrap();
            assert_eq!(probe.enabled_steps(), probe.disabled_steps(142));
        }

        #[test]
        fn test_regression_body_replaces_disabled_in_bounds() {
            let probe = Probe::builder("x", "https://example.com/")
                .enabled(vec![navigate()])
                .disabled(vec![navigate(), navigate()])
                .regression(Some(140), None, vec![navigate(), navigate(), navigate()])
                .build()
                .unwrap();
            assert_eq!(probe.disabled_steps(139).len(), 2);
            assert_eq!(probe.disabled_steps(140).len(), 3);
            assert_eq!(probe.disabled_steps(141).len(), 3);
            assert_eq!(probe.enabled_steps().len(), 1);
        }

        #[test]
        fn test_version_within_bounds() {
            assert!(version_within(None, None, 1));
            assert!(version_within(Some(120), None, 120));
            assert!(!version_within(Some(120), None, 119));
            assert!(version_within(None, Some(140), 140));
            assert!(!version_within(None, Some(140), 141));
            assert!(version_within(Some(120), Some(140), 130));
        }
    }
}
