//! Environment profile consulted by the capability matcher.
//!
//! The profile is assembled once at session start and read-only
//! thereafter: platform tag, Firefox major version, headless flag,
//! scrollbar visibility, physical-vs-emulated tag, and the ambient
//! credentials store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::result::{WebcompatError, WebcompatResult};

// =============================================================================
// PLATFORM
// =============================================================================

/// Platform tag a probe may be gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Desktop Linux.
    Linux,
    /// macOS.
    Mac,
    /// Desktop Windows.
    Windows,
    /// Firefox for Android (GeckoView).
    Android,
}

impl Platform {
    /// All platform tags.
    pub const ALL: [Self; 4] = [Self::Linux, Self::Mac, Self::Windows, Self::Android];

    /// Tag string used in probe metadata and run records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Mac => "mac",
            Self::Windows => "windows",
            Self::Android => "android",
        }
    }

    /// Detect the host platform.
    ///
    /// Android runs are driven from a desktop host and must override the
    /// tag explicitly; detection only ever reports desktop platforms.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::Mac
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

impl FromStr for Platform {
    type Err = WebcompatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "mac" | "macos" | "darwin" => Ok(Self::Mac),
            "windows" | "win" => Ok(Self::Windows),
            "android" => Ok(Self::Android),
            other => Err(WebcompatError::assertion(format!(
                "unknown platform tag `{other}` (expected linux, mac, windows, or android)"
            ))),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Login credentials for one site.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Account name.
    pub user: String,
    /// Account password.
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read-only map of site key to credentials.
///
/// A handful of probes need a logged-in account to reach the behavior
/// under test. The store is shared across workers and never mutated
/// after session start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    entries: HashMap<String, Credential>,
}

impl CredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a store from a JSON object of `site -> {user, password}`.
    pub fn from_json(json: &str) -> WebcompatResult<Self> {
        let entries: HashMap<String, Credential> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    /// Load a store from a JSON file.
    pub fn from_file(path: &Path) -> WebcompatResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Add an entry (test and fixture construction).
    #[must_use]
    pub fn with_entry(
        mut self,
        site: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            site.into(),
            Credential {
                user: user.into(),
                password: password.into(),
            },
        );
        self
    }

    /// Look up credentials for a site key.
    #[must_use]
    pub fn get(&self, site: &str) -> Option<&Credential> {
        self.entries.get(site)
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// ENVIRONMENT PROFILE
// =============================================================================

/// Immutable description of the current run environment.
#[derive(Clone, PartialEq)]
pub struct EnvironmentProfile {
    platform: Platform,
    firefox_major: u32,
    headless: bool,
    visible_scrollbars: bool,
    physical_device: bool,
    credentials: CredentialStore,
}

impl EnvironmentProfile {
    /// Create a profile for the given platform and Firefox major version.
    ///
    /// Defaults: headed, visible scrollbars on desktop (the launcher
    /// forces classic scrollbars via prefs), hidden overlay scrollbars on
    /// Android, emulated device, empty credential store.
    #[must_use]
    pub fn new(platform: Platform, firefox_major: u32) -> Self {
        Self {
            platform,
            firefox_major,
            headless: false,
            visible_scrollbars: platform != Platform::Android,
            physical_device: false,
            credentials: CredentialStore::new(),
        }
    }

    /// Set the headless flag.
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set scrollbar visibility.
    #[must_use]
    pub const fn with_visible_scrollbars(mut self, visible: bool) -> Self {
        self.visible_scrollbars = visible;
        self
    }

    /// Mark the platform as a real device rather than an emulator.
    #[must_use]
    pub const fn with_physical_device(mut self, physical: bool) -> Self {
        self.physical_device = physical;
        self
    }

    /// Attach the ambient credential store.
    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    /// Platform tag.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Firefox integer major version.
    #[must_use]
    pub const fn firefox_major(&self) -> u32 {
        self.firefox_major
    }

    /// Whether the browser runs headless.
    #[must_use]
    pub const fn headless(&self) -> bool {
        self.headless
    }

    /// Whether scrollbars are visible (layout-sensitive probes gate on
    /// this).
    #[must_use]
    pub const fn visible_scrollbars(&self) -> bool {
        self.visible_scrollbars
    }

    /// Whether the platform is a real device rather than an emulator.
    #[must_use]
    pub const fn physical_device(&self) -> bool {
        self.physical_device
    }

    /// Ambient credentials.
    #[must_use]
    pub const fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }
}

impl std::fmt::Debug for EnvironmentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentProfile")
            .field("platform", &self.platform)
            .field("firefox_major", &self.firefox_major)
            .field("headless", &self.headless)
            .field("visible_scrollbars", &self.visible_scrollbars)
            .field("physical_device", &self.physical_device)
            .field("credentials", &format!("{} entries", self.credentials.entries.len()))
            .finish()
    }
}
