//! Browser and driver lifecycle.
//!
//! A probe side needs a geckodriver endpoint, a throwaway Firefox
//! profile with the intervention prefs set one way or the other, and a
//! capability payload tying the two together. [`GeckodriverLauncher`]
//! spawns and supervises the driver process; [`RemoteEndpointLauncher`]
//! points at an endpoint someone else manages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::result::{WebcompatError, WebcompatResult};

/// How long geckodriver gets to start accepting connections.
const DRIVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval between readiness probes while the driver starts.
const DRIVER_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Prefs toggled together to turn the webcompat interventions on or
/// off for a whole session.
const INTERVENTION_PREFS: [&str; 3] = [
    "extensions.webcompat.perform_injections",
    "extensions.webcompat.perform_ua_overrides",
    "extensions.webcompat.enable_shims",
];

// =============================================================================
// LAUNCH OPTIONS
// =============================================================================

/// Per-session browser configuration.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Run Firefox without a window.
    pub headless: bool,
    /// Load the webcompat interventions.
    pub interventions: bool,
    /// Force scrollbars to take up layout space.
    pub visible_scrollbars: bool,
    /// Explicit Firefox binary; geckodriver's default otherwise.
    pub firefox_binary: Option<PathBuf>,
}

impl LaunchOptions {
    /// Options with everything off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode.
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set whether interventions load.
    #[must_use]
    pub const fn with_interventions(mut self, interventions: bool) -> Self {
        self.interventions = interventions;
        self
    }

    /// Set whether scrollbars take up layout space.
    #[must_use]
    pub const fn with_visible_scrollbars(mut self, visible: bool) -> Self {
        self.visible_scrollbars = visible;
        self
    }

    /// Point at a specific Firefox binary.
    #[must_use]
    pub fn with_firefox_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.firefox_binary = Some(binary.into());
        self
    }
}

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Clone)]
enum PrefValue {
    Bool(bool),
    Int(i64),
}

impl std::fmt::Display for PrefValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Builds a throwaway Firefox profile directory with a `user.js`.
#[derive(Debug)]
pub struct ProfileBuilder {
    prefs: Vec<(String, PrefValue)>,
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileBuilder {
    /// A profile with the automation base prefs: no default-browser
    /// prompt, no update checks, no telemetry, blank start page.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self { prefs: Vec::new() };
        builder.push_bool("browser.shell.checkDefaultBrowser", false);
        builder.push_bool("app.update.disabledForTesting", true);
        builder.push_bool("datareporting.policy.dataSubmissionEnabled", false);
        builder.push_int("browser.startup.page", 0);
        builder.push_bool("browser.aboutConfig.showWarning", false);
        builder
    }

    /// Toggle the webcompat intervention prefs as a group.
    #[must_use]
    pub fn with_interventions(mut self, enabled: bool) -> Self {
        for pref in INTERVENTION_PREFS {
            self.push_bool(pref, enabled);
        }
        self
    }

    /// Turn off overlay scrollbars so they occupy layout space.
    #[must_use]
    pub fn with_visible_scrollbars(mut self, visible: bool) -> Self {
        if visible {
            self.push_int("ui.useOverlayScrollbars", 0);
        }
        self
    }

    /// Add one boolean pref.
    #[must_use]
    pub fn with_pref(mut self, name: &str, value: bool) -> Self {
        self.push_bool(name, value);
        self
    }

    fn push_bool(&mut self, name: &str, value: bool) {
        self.prefs.push((name.to_string(), PrefValue::Bool(value)));
    }

    fn push_int(&mut self, name: &str, value: i64) {
        self.prefs.push((name.to_string(), PrefValue::Int(value)));
    }

    /// Render the `user.js` body.
    #[must_use]
    pub fn user_js(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.prefs {
            out.push_str(&format!("user_pref(\"{name}\", {value});\n"));
        }
        out
    }

    /// Materialize the profile directory. Removed from disk when the
    /// returned profile drops.
    pub fn build(&self) -> WebcompatResult<BrowserProfile> {
        let dir = tempfile::Builder::new()
            .prefix("webcompat-profile-")
            .tempdir()?;
        std::fs::write(dir.path().join("user.js"), self.user_js())?;
        tracing::debug!(path = %dir.path().display(), "profile created");
        Ok(BrowserProfile { dir })
    }
}

/// Profile matching the launch options.
pub fn profile_for(options: &LaunchOptions) -> WebcompatResult<BrowserProfile> {
    ProfileBuilder::new()
        .with_interventions(options.interventions)
        .with_visible_scrollbars(options.visible_scrollbars)
        .build()
}

/// A materialized profile directory.
#[derive(Debug)]
pub struct BrowserProfile {
    dir: tempfile::TempDir,
}

impl BrowserProfile {
    /// Directory passed to Firefox via `-profile`.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Capability payload for a new session over this profile.
///
/// Page load strategy is `none`: navigation readiness is polled by the
/// client, never awaited in the driver. `webSocketUrl` requests the
/// BiDi channel.
#[must_use]
pub fn firefox_capabilities(profile: &BrowserProfile, options: &LaunchOptions) -> Value {
    let mut args = vec![
        "-profile".to_string(),
        profile.path().display().to_string(),
    ];
    if options.headless {
        args.push("-headless".to_string());
    }
    let mut firefox_options = json!({ "args": args });
    if let Some(binary) = &options.firefox_binary {
        firefox_options["binary"] = json!(binary.display().to_string());
    }
    json!({
        "acceptInsecureCerts": true,
        "pageLoadStrategy": "none",
        "webSocketUrl": true,
        "moz:firefoxOptions": firefox_options,
    })
}

// =============================================================================
// LAUNCHERS
// =============================================================================

/// Supplies a WebDriver endpoint for one session.
#[async_trait]
pub trait BrowserLauncher: Send + Sync + std::fmt::Debug {
    /// Bring up (or point at) an endpoint ready to accept a session.
    async fn launch(&self) -> WebcompatResult<LaunchedBrowser>;
}

/// A running (or remote) automation endpoint.
#[derive(Debug)]
pub struct LaunchedBrowser {
    endpoint: String,
    child: Option<tokio::process::Child>,
}

impl LaunchedBrowser {
    /// Base URL of the WebDriver server.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop the supervised driver process, if this launcher owns one.
    pub async fn shutdown(mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "geckodriver did not shut down cleanly");
            }
        }
    }
}

/// Spawns one geckodriver per session on a free local port.
#[derive(Debug, Clone)]
pub struct GeckodriverLauncher {
    binary: PathBuf,
}

impl GeckodriverLauncher {
    /// Launcher for the given geckodriver binary.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for GeckodriverLauncher {
    fn default() -> Self {
        Self::new("geckodriver")
    }
}

#[async_trait]
impl BrowserLauncher for GeckodriverLauncher {
    async fn launch(&self) -> WebcompatResult<LaunchedBrowser> {
        let port = free_port()?;
        let mut child = tokio::process::Command::new(&self.binary)
            .arg("--port")
            .arg(port.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WebcompatError::launch(format!(
                    "could not spawn {}: {e}; is geckodriver installed?",
                    self.binary.display()
                ))
            })?;

        // The port was free a moment ago; a bind collision surfaces as
        // the readiness probe never connecting.
        let deadline = Instant::now() + DRIVER_STARTUP_TIMEOUT;
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(WebcompatError::launch(format!(
                    "geckodriver exited with {status} before accepting connections"
                )));
            }
            if tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_ok()
            {
                break;
            }
            if Instant::now() >= deadline {
                let _ = child.kill().await;
                return Err(WebcompatError::launch(format!(
                    "geckodriver on port {port} not ready after {}s",
                    DRIVER_STARTUP_TIMEOUT.as_secs()
                )));
            }
            tokio::time::sleep(DRIVER_POLL_INTERVAL).await;
        }

        let endpoint = format!("http://127.0.0.1:{port}");
        tracing::debug!(endpoint, "geckodriver ready");
        Ok(LaunchedBrowser {
            endpoint,
            child: Some(child),
        })
    }
}

/// Uses an endpoint managed outside the harness.
#[derive(Debug, Clone)]
pub struct RemoteEndpointLauncher {
    endpoint: String,
}

impl RemoteEndpointLauncher {
    /// Launcher for a fixed endpoint such as `http://127.0.0.1:4444`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for RemoteEndpointLauncher {
    async fn launch(&self) -> WebcompatResult<LaunchedBrowser> {
        Ok(LaunchedBrowser {
            endpoint: self.endpoint.clone(),
            child: None,
        })
    }
}

fn free_port() -> WebcompatResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
