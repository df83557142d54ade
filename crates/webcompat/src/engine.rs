//! Dual-run differential engine.
//!
//! Every runnable probe is executed twice on fresh browser sessions,
//! first with the interventions enabled, then without, and the
//! classifier folds the outcome pair into a verdict. Sessions come from
//! a [`SessionFactory`] so tests can script them; production runs use
//! [`LiveSessionFactory`], which launches one driver, profile, and
//! browser per side. A semaphore bounds how many probes hold live
//! sessions at once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use crate::classifier;
use crate::client::Session;
use crate::environment::EnvironmentProfile;
use crate::executor;
use crate::launcher::{
    firefox_capabilities, profile_for, BrowserLauncher, BrowserProfile, LaunchOptions,
    LaunchedBrowser,
};
use crate::matcher::{CapabilityMatcher, MatchDecision};
use crate::outcome::{ProbeVerdict, RunOutcome, Verdict};
use crate::probe::{Probe, ProbeMetadata, Step};
use crate::result::WebcompatResult;
use crate::transport::WebDriverTransport;

/// Probes holding live sessions at once, unless overridden.
pub const DEFAULT_WORKERS: usize = 4;

/// Budget for ending a session whose browser may already be wedged.
const TEARDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

// =============================================================================
// INTERVENTION MODE
// =============================================================================

/// Which way the intervention prefs are set for one side of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionMode {
    /// Interventions loaded, as Firefox ships.
    Enabled,
    /// Interventions off, exposing the site's bare behavior.
    Disabled,
}

impl InterventionMode {
    /// Side label used in logs and artifact file names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "with",
            Self::Disabled => "without",
        }
    }

    /// Whether the intervention prefs are set.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl std::fmt::Display for InterventionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

/// A live session and the resources backing it.
///
/// Teardown order matters: the WebDriver session ends first so Firefox
/// exits cleanly, then the driver process is stopped, and the profile
/// directory is removed when it drops.
#[derive(Debug)]
pub struct ActiveSession {
    session: Session,
    browser: Option<LaunchedBrowser>,
    profile: Option<BrowserProfile>,
}

impl ActiveSession {
    /// Wrap a bare session with no owned browser or profile.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            browser: None,
            profile: None,
        }
    }

    /// Attach the driver process backing this session.
    #[must_use]
    pub fn with_browser(mut self, browser: LaunchedBrowser) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Attach the profile directory backing this session.
    #[must_use]
    pub fn with_profile(mut self, profile: BrowserProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// The live session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// End the session and release everything behind it.
    pub async fn teardown(self) {
        match tokio::time::timeout(TEARDOWN_TIMEOUT, self.session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "session close failed"),
            Err(_) => tracing::debug!("session close timed out"),
        }
        if let Some(browser) = self.browser {
            browser.shutdown().await;
        }
    }
}

/// Creates a live session configured for one side of the toggle.
#[async_trait]
pub trait SessionFactory: Send + Sync + std::fmt::Debug {
    /// Bring up a browser and open a session on it.
    async fn create(&self, mode: InterventionMode) -> WebcompatResult<ActiveSession>;
}

/// Production factory: one driver, profile, and browser per session.
#[derive(Debug)]
pub struct LiveSessionFactory {
    launcher: Arc<dyn BrowserLauncher>,
    options: LaunchOptions,
}

impl LiveSessionFactory {
    /// Factory launching through `launcher`, with `options` as the
    /// per-session base. The intervention toggle is overridden per side.
    #[must_use]
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: LaunchOptions) -> Self {
        Self { launcher, options }
    }
}

#[async_trait]
impl SessionFactory for LiveSessionFactory {
    async fn create(&self, mode: InterventionMode) -> WebcompatResult<ActiveSession> {
        let options = self.options.clone().with_interventions(mode.is_enabled());
        let profile = profile_for(&options)?;
        let capabilities = firefox_capabilities(&profile, &options);
        let browser = self.launcher.launch().await?;
        let transport = Arc::new(WebDriverTransport::new(browser.endpoint()));
        match Session::create(transport, capabilities).await {
            Ok(session) => Ok(ActiveSession::new(session)
                .with_browser(browser)
                .with_profile(profile)),
            Err(e) => {
                browser.shutdown().await;
                Err(e)
            }
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Engine-level knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum probes holding live sessions at once.
    pub workers: usize,
    /// Directory for failure screenshots; `None` disables capture.
    pub artifacts_dir: Option<PathBuf>,
    /// Rerun a probe once, on fresh sessions, when its pair ends in an
    /// infrastructure error. Skips are never retried.
    pub retry_infrastructure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            artifacts_dir: None,
            retry_infrastructure: true,
        }
    }
}

impl EngineConfig {
    /// The default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker bound.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Store failure screenshots under the given directory.
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// Toggle the infrastructure-error retry.
    #[must_use]
    pub const fn with_retry_infrastructure(mut self, retry: bool) -> Self {
        self.retry_infrastructure = retry;
        self
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Progress notification emitted as each probe finishes.
#[derive(Debug, Clone)]
pub struct ProbeCompleted {
    /// Probe id.
    pub id: String,
    /// Verdict reached.
    pub verdict: Verdict,
    /// One-line explanation of the verdict.
    pub explanation: String,
}

/// Final result for one probe, ready for the reporter.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// The probe's identity and gating block.
    pub metadata: ProbeMetadata,
    /// Verdict and the evidence it was derived from.
    pub verdict: ProbeVerdict,
}

/// Runs a fleet of probes and produces one report per probe.
#[derive(Debug, Clone)]
pub struct DualRunEngine {
    factory: Arc<dyn SessionFactory>,
    environment: EnvironmentProfile,
    config: EngineConfig,
    pool: Arc<Semaphore>,
    progress: Option<mpsc::UnboundedSender<ProbeCompleted>>,
}

impl DualRunEngine {
    /// Engine over the given factory and environment.
    #[must_use]
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        environment: EnvironmentProfile,
        config: EngineConfig,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            factory,
            environment,
            config,
            pool,
            progress: None,
        }
    }

    /// Send a [`ProbeCompleted`] event down `sender` as each probe
    /// finishes.
    #[must_use]
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProbeCompleted>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Run every probe and return reports in the input order.
    pub async fn run_fleet(&self, probes: Vec<Probe>) -> Vec<ProbeReport> {
        let mut handles = Vec::with_capacity(probes.len());
        for probe in probes {
            let engine = self.clone();
            let metadata = probe.metadata.clone();
            let handle = tokio::spawn(async move { engine.run_probe(probe).await });
            handles.push((metadata, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (metadata, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(probe = %metadata.id, error = %e, "probe task did not finish");
                    ProbeReport {
                        metadata,
                        verdict: harness_verdict(format!("probe task aborted: {e}")),
                    }
                }
            };
            reports.push(report);
        }
        reports
    }

    async fn run_probe(&self, probe: Probe) -> ProbeReport {
        let verdict = self.evaluate_probe(&probe).await;
        tracing::info!(
            probe = %probe.metadata.id,
            verdict = %verdict.verdict,
            explanation = %verdict.explanation,
            "probe finished"
        );
        if let Some(progress) = &self.progress {
            let _ = progress.send(ProbeCompleted {
                id: probe.metadata.id.clone(),
                verdict: verdict.verdict,
                explanation: verdict.explanation.clone(),
            });
        }
        ProbeReport {
            metadata: probe.metadata,
            verdict,
        }
    }

    async fn evaluate_probe(&self, probe: &Probe) -> ProbeVerdict {
        // Matcher skips cost nothing and never occupy a worker slot.
        if let MatchDecision::Skip(reason) =
            CapabilityMatcher::new(&self.environment).evaluate(&probe.metadata)
        {
            tracing::info!(probe = %probe.metadata.id, %reason, "not runnable here");
            return ProbeVerdict::skipped_at_match(&reason);
        }

        let Ok(_permit) = self.pool.acquire().await else {
            return harness_verdict("worker pool closed before the probe ran");
        };
        let verdict = self.run_pair(probe).await;
        if verdict.verdict == Verdict::InfrastructureError && self.config.retry_infrastructure {
            tracing::warn!(
                probe = %probe.metadata.id,
                explanation = %verdict.explanation,
                "retrying once on fresh sessions"
            );
            return self.run_pair(probe).await;
        }
        verdict
    }

    /// One full with/without pair on fresh sessions.
    async fn run_pair(&self, probe: &Probe) -> ProbeVerdict {
        let (with, observed_major) = self
            .run_side(probe, InterventionMode::Enabled, probe.enabled_steps())
            .await;
        if !(with.status.is_pass() || with.status.is_fail()) {
            // A skip or harness failure on the first side already
            // decides the verdict; the second side never runs.
            return classifier::verdict_for(with, None);
        }
        let major = observed_major.unwrap_or(self.environment.firefox_major());
        let (without, _) = self
            .run_side(probe, InterventionMode::Disabled, probe.disabled_steps(major))
            .await;
        classifier::verdict_for(with, Some(without))
    }

    /// One body on a fresh session. Returns the outcome and the major
    /// version the browser reported.
    async fn run_side(
        &self,
        probe: &Probe,
        mode: InterventionMode,
        steps: &[Step],
    ) -> (RunOutcome, Option<u32>) {
        let metadata = &probe.metadata;
        let started = Instant::now();
        let active = match self.factory.create(mode).await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(probe = %metadata.id, side = mode.as_str(), error = %e, "session setup failed");
                return (
                    RunOutcome::error(format!("session setup failed: {e}"))
                        .with_elapsed(started.elapsed()),
                    None,
                );
            }
        };
        let observed_major = active.session().browser_major();
        let deadline = metadata.timeout();
        tracing::debug!(probe = %metadata.id, side = mode.as_str(), "side starting");
        let outcome = match tokio::time::timeout(
            deadline,
            executor::run_body(
                active.session(),
                &self.environment,
                metadata,
                steps,
                mode.as_str(),
                self.config.artifacts_dir.as_deref(),
            ),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(probe = %metadata.id, side = mode.as_str(), "per-probe deadline hit");
                RunOutcome::error(format!(
                    "probe body still running after {}s",
                    deadline.as_secs()
                ))
                .with_elapsed(started.elapsed())
            }
        };
        active.teardown().await;
        (outcome, observed_major)
    }
}

fn harness_verdict(message: impl Into<String>) -> ProbeVerdict {
    let message = message.into();
    ProbeVerdict {
        verdict: Verdict::InfrastructureError,
        explanation: message.clone(),
        with_outcome: RunOutcome::error(message),
        without_outcome: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Platform;
    use crate::outcome::RunStatus;
    use crate::result::WebcompatError;
    use crate::transport::{MockTransport, MOCK_SESSION_ID};
    use crate::wait::NavigationWait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Hands out sessions over pre-scripted transports in call order
    /// and tracks how many handed-out sessions are open at once.
    #[derive(Debug)]
    struct ScriptedFactory {
        transports: StdMutex<VecDeque<Arc<MockTransport>>>,
        handed: StdMutex<Vec<Arc<MockTransport>>>,
        calls: StdMutex<Vec<InterventionMode>>,
        max_live: AtomicUsize,
    }

    impl ScriptedFactory {
        fn new(transports: Vec<Arc<MockTransport>>) -> Arc<Self> {
            Arc::new(Self {
                transports: StdMutex::new(transports.into()),
                handed: StdMutex::new(Vec::new()),
                calls: StdMutex::new(Vec::new()),
                max_live: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<InterventionMode> {
            self.calls.lock().unwrap().clone()
        }

        fn live_sessions(&self) -> usize {
            let delete = format!("DELETE /session/{MOCK_SESSION_ID}");
            self.handed
                .lock()
                .unwrap()
                .iter()
                .filter(|t| !t.was_called(&delete))
                .count()
        }
    }

    #[async_trait]
    impl SessionFactory for ScriptedFactory {
        async fn create(&self, mode: InterventionMode) -> WebcompatResult<ActiveSession> {
            self.calls.lock().unwrap().push(mode);
            let transport = self
                .transports
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| WebcompatError::launch("factory has no transports left"))?;
            self.handed.lock().unwrap().push(Arc::clone(&transport));
            self.max_live
                .fetch_max(self.live_sessions(), Ordering::SeqCst);
            let session = Session::create(transport, json!({})).await?;
            Ok(ActiveSession::new(session))
        }
    }

    fn clean_transport() -> Arc<MockTransport> {
        let mock = Arc::new(MockTransport::new());
        mock.set_default(&format!("POST /session/{MOCK_SESSION_ID}/url"), Value::Null);
        mock
    }

    fn navigate_step() -> Step {
        Step::Navigate {
            url: None,
            wait: NavigationWait::None,
            timeout_ms: None,
            expect_console_message: None,
        }
    }

    fn navigate_to(url: &str) -> Step {
        Step::Navigate {
            url: Some(url.to_string()),
            wait: NavigationWait::None,
            timeout_ms: None,
            expect_console_message: None,
        }
    }

    fn pass_probe(id: &str) -> Probe {
        Probe::builder(id, "https://example.com/")
            .enabled(vec![])
            .disabled(vec![])
            .build()
            .unwrap()
    }

    fn environment() -> EnvironmentProfile {
        EnvironmentProfile::new(Platform::Linux, 142)
    }

    fn engine(factory: Arc<ScriptedFactory>, config: EngineConfig) -> DualRunEngine {
        DualRunEngine::new(factory, environment(), config)
    }

    mod mode_tests {
        use super::*;

        #[test]
        fn test_side_labels() {
            assert_eq!(InterventionMode::Enabled.as_str(), "with");
            assert_eq!(InterventionMode::Disabled.as_str(), "without");
            assert!(InterventionMode::Enabled.is_enabled());
            assert!(!InterventionMode::Disabled.is_enabled());
        }
    }

    mod pair_tests {
        use super::*;

        #[tokio::test]
        async fn test_pair_runs_enabled_side_first_on_fresh_sessions() {
            let (t1, t2) = (clean_transport(), clean_transport());
            let factory = ScriptedFactory::new(vec![Arc::clone(&t1), Arc::clone(&t2)]);
            let engine = engine(Arc::clone(&factory), EngineConfig::new());

            let reports = engine.run_fleet(vec![pass_probe("pair_order")]).await;

            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].verdict.verdict, Verdict::WorkaroundObsolete);
            assert_eq!(
                factory.calls(),
                vec![InterventionMode::Enabled, InterventionMode::Disabled]
            );
            for transport in [t1, t2] {
                assert!(transport.was_called("POST /session"));
                assert!(transport.was_called(&format!("DELETE /session/{MOCK_SESSION_ID}")));
            }
        }

        #[tokio::test]
        async fn test_side_one_skip_aborts_the_pair_and_is_not_retried() {
            let factory = ScriptedFactory::new(vec![clean_transport(), clean_transport()]);
            let probe = Probe::builder("skips_first", "https://example.com/")
                .enabled(vec![Step::SkipIfHeadless {
                    reason: "needs a window".into(),
                }])
                .disabled(vec![])
                .build()
                .unwrap();
            let headless = environment().with_headless(true);
            let engine = DualRunEngine::new(
                Arc::clone(&factory) as Arc<dyn SessionFactory>,
                headless,
                EngineConfig::new(),
            );

            let reports = engine.run_fleet(vec![probe]).await;

            assert_eq!(reports[0].verdict.verdict, Verdict::Skipped);
            assert_eq!(
                reports[0].verdict.with_outcome.status,
                RunStatus::SkipEnvironment
            );
            assert!(reports[0].verdict.without_outcome.is_none());
            assert_eq!(factory.calls(), vec![InterventionMode::Enabled]);
        }

        #[tokio::test]
        async fn test_infrastructure_error_retried_once_on_fresh_sessions() {
            // The first session's navigation is unscripted, so it fails
            // as a transport fault. The retry pair gets clean wires.
            let broken = Arc::new(MockTransport::new());
            let factory = ScriptedFactory::new(vec![broken, clean_transport(), clean_transport()]);
            let probe = Probe::builder("flaky", "https://example.com/")
                .enabled(vec![navigate_step()])
                .disabled(vec![navigate_step()])
                .build()
                .unwrap();
            let engine = engine(Arc::clone(&factory), EngineConfig::new());

            let reports = engine.run_fleet(vec![probe]).await;

            assert_eq!(reports[0].verdict.verdict, Verdict::WorkaroundObsolete);
            assert_eq!(
                factory.calls(),
                vec![
                    InterventionMode::Enabled,
                    InterventionMode::Enabled,
                    InterventionMode::Disabled,
                ]
            );
        }

        #[tokio::test]
        async fn test_retry_disabled_reports_the_infrastructure_error() {
            let broken = Arc::new(MockTransport::new());
            let factory = ScriptedFactory::new(vec![Arc::clone(&broken)]);
            let probe = Probe::builder("flaky", "https://example.com/")
                .enabled(vec![navigate_step()])
                .disabled(vec![])
                .build()
                .unwrap();
            let config = EngineConfig::new().with_retry_infrastructure(false);
            let engine = engine(Arc::clone(&factory), config);

            let reports = engine.run_fleet(vec![probe]).await;

            assert_eq!(reports[0].verdict.verdict, Verdict::InfrastructureError);
            assert!(reports[0].verdict.explanation.contains("harness failure"));
            assert_eq!(factory.calls(), vec![InterventionMode::Enabled]);
            // The broken session is still torn down.
            assert!(broken.was_called(&format!("DELETE /session/{MOCK_SESSION_ID}")));
        }

        #[tokio::test]
        async fn test_regression_uses_the_session_reported_version() {
            // The environment claims Firefox 120, but the session
            // reports 142; the regression body gated at 140 applies.
            let (t1, t2) = (clean_transport(), clean_transport());
            let factory = ScriptedFactory::new(vec![Arc::clone(&t1), Arc::clone(&t2)]);
            let probe = Probe::builder("regressed", "https://example.com/")
                .enabled(vec![])
                .disabled(vec![navigate_step()])
                .regression(
                    Some(140),
                    None,
                    vec![navigate_to("https://example.com/regressed")],
                )
                .build()
                .unwrap();
            let old_env = EnvironmentProfile::new(Platform::Linux, 120);
            let engine = DualRunEngine::new(
                Arc::clone(&factory) as Arc<dyn SessionFactory>,
                old_env,
                EngineConfig::new(),
            );

            engine.run_fleet(vec![probe]).await;

            let navigations: Vec<_> = t2
                .history()
                .into_iter()
                .filter(|c| c.starts_with(&format!("POST /session/{MOCK_SESSION_ID}/url")))
                .collect();
            assert_eq!(navigations.len(), 1);
            assert!(navigations[0].contains("regressed"));
        }

        #[tokio::test]
        async fn test_regression_body_ignored_outside_its_bounds() {
            let (t1, t2) = (clean_transport(), clean_transport());
            let factory = ScriptedFactory::new(vec![Arc::clone(&t1), Arc::clone(&t2)]);
            let probe = Probe::builder("not_regressed", "https://example.com/")
                .enabled(vec![])
                .disabled(vec![navigate_step()])
                .regression(
                    Some(150),
                    None,
                    vec![navigate_to("https://example.com/regressed")],
                )
                .build()
                .unwrap();
            let engine = engine(Arc::clone(&factory), EngineConfig::new());

            engine.run_fleet(vec![probe]).await;

            let history = t2.history().join("\n");
            assert!(history.contains("https://example.com/"));
            assert!(!history.contains("regressed"));
        }

        #[tokio::test]
        async fn test_single_sided_probe_runs_lone_body_on_both_sides() {
            let (t1, t2) = (clean_transport(), clean_transport());
            let factory = ScriptedFactory::new(vec![Arc::clone(&t1), Arc::clone(&t2)]);
            let probe = Probe::builder("honeywell_style", "https://example.com/")
                .disabled(vec![navigate_step()])
                .build()
                .unwrap();
            let engine = engine(Arc::clone(&factory), EngineConfig::new());

            let reports = engine.run_fleet(vec![probe]).await;

            assert_eq!(reports[0].verdict.verdict, Verdict::WorkaroundObsolete);
            let url_key = format!("POST /session/{MOCK_SESSION_ID}/url");
            assert!(t1.was_called(&url_key));
            assert!(t2.was_called(&url_key));
        }

        #[tokio::test(start_paused = true)]
        async fn test_per_probe_deadline_forces_an_error() {
            let slow = clean_transport();
            let factory = ScriptedFactory::new(vec![Arc::clone(&slow)]);
            let probe = Probe::builder("sleeper", "https://example.com/")
                .timeout_secs(2)
                .enabled(vec![Step::Sleep { ms: 60_000 }])
                .disabled(vec![])
                .build()
                .unwrap();
            let config = EngineConfig::new().with_retry_infrastructure(false);
            let engine = engine(Arc::clone(&factory), config);

            let reports = engine.run_fleet(vec![probe]).await;

            assert_eq!(reports[0].verdict.verdict, Verdict::InfrastructureError);
            assert!(reports[0].verdict.explanation.contains("still running"));
            // The session is torn down even though the body never
            // finished.
            assert!(slow.was_called(&format!("DELETE /session/{MOCK_SESSION_ID}")));
        }

        #[tokio::test]
        async fn test_session_setup_failure_is_retried_then_reported() {
            let factory = ScriptedFactory::new(vec![]);
            let engine = engine(Arc::clone(&factory), EngineConfig::new());

            let reports = engine.run_fleet(vec![pass_probe("no_browser")]).await;

            assert_eq!(reports[0].verdict.verdict, Verdict::InfrastructureError);
            assert!(reports[0].verdict.explanation.contains("session setup failed"));
            assert_eq!(
                factory.calls(),
                vec![InterventionMode::Enabled, InterventionMode::Enabled]
            );
        }
    }

    mod fleet_tests {
        use super::*;

        #[tokio::test]
        async fn test_matcher_skip_runs_no_sessions() {
            let factory = ScriptedFactory::new(vec![]);
            let probe = Probe::builder("android_only", "https://example.com/")
                .only_platforms([Platform::Android])
                .disabled(vec![])
                .build()
                .unwrap();
            let engine = engine(Arc::clone(&factory), EngineConfig::new());

            let reports = engine.run_fleet(vec![probe]).await;

            assert_eq!(reports[0].verdict.verdict, Verdict::Skipped);
            assert!(reports[0].verdict.explanation.contains("not runnable here"));
            assert!(factory.calls().is_empty());
        }

        #[tokio::test]
        async fn test_one_worker_serializes_sessions_and_keeps_input_order() {
            let transports = (0..4).map(|_| clean_transport()).collect();
            let factory = ScriptedFactory::new(transports);
            let probes = vec![pass_probe("first"), pass_probe("second")];
            let config = EngineConfig::new().with_workers(1);
            let engine = engine(Arc::clone(&factory), config);

            let reports = engine.run_fleet(probes).await;

            assert_eq!(reports.len(), 2);
            assert_eq!(reports[0].metadata.id, "first");
            assert_eq!(reports[1].metadata.id, "second");
            assert_eq!(factory.calls().len(), 4);
            assert_eq!(factory.max_live.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_progress_events_emitted_per_probe() {
            let factory = ScriptedFactory::new(vec![clean_transport(), clean_transport()]);
            let android_only = Probe::builder("beta", "https://example.com/")
                .only_platforms([Platform::Android])
                .disabled(vec![])
                .build()
                .unwrap();
            let (tx, mut rx) = mpsc::unbounded_channel();
            let engine = engine(Arc::clone(&factory), EngineConfig::new()).with_progress(tx);

            engine
                .run_fleet(vec![pass_probe("alpha"), android_only])
                .await;

            let mut seen = Vec::new();
            while let Ok(event) = rx.try_recv() {
                seen.push((event.id, event.verdict));
            }
            seen.sort_by(|a, b| a.0.cmp(&b.0));
            assert_eq!(
                seen,
                vec![
                    ("alpha".to_string(), Verdict::WorkaroundObsolete),
                    ("beta".to_string(), Verdict::Skipped),
                ]
            );
        }
    }
}
