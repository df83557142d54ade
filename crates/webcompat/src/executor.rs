//! Step interpreter: runs one probe body against a live session and
//! reduces the result to a [`RunOutcome`].
//!
//! The interpreter is where the failure taxonomy becomes outcome
//! status: skip signals pass through verbatim, infrastructure faults
//! become `error`, everything else the site did wrong becomes `fail`
//! with the console tail and a screenshot attached as evidence.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::broadcast;

use crate::client::{Element, Session};
use crate::environment::EnvironmentProfile;
use crate::events::RemoteEvent;
use crate::helpers;
use crate::outcome::RunOutcome;
use crate::probe::{ArmAction, CredentialField, MatchArm, ProbeMetadata, Step};
use crate::result::{WebcompatError, WebcompatResult};
use crate::wait::{NavigateOptions, WaitOptions, DEFAULT_WAIT_TIMEOUT_MS};

/// Console lines kept as failure evidence.
pub const CONSOLE_TAIL_LIMIT: usize = 20;

/// Wait budget for the trending-strip lookup.
const TRENDING_STRIP_WAIT: Duration = Duration::from_secs(10);

// =============================================================================
// RUN STATE
// =============================================================================

/// Per-run interpreter state.
struct RunState<'a> {
    environment: &'a EnvironmentProfile,
    metadata: &'a ProbeMetadata,
    console_rx: broadcast::Receiver<RemoteEvent>,
    console_tail: VecDeque<String>,
}

impl<'a> RunState<'a> {
    fn new(
        session: &Session,
        environment: &'a EnvironmentProfile,
        metadata: &'a ProbeMetadata,
    ) -> Self {
        Self {
            environment,
            metadata,
            console_rx: session.subscribe_events(),
            console_tail: VecDeque::new(),
        }
    }

    /// Pull pending console events into the bounded tail.
    fn drain_console(&mut self) {
        loop {
            match self.console_rx.try_recv() {
                Ok(RemoteEvent::Console { text, level }) => {
                    if self.console_tail.len() == CONSOLE_TAIL_LIMIT {
                        self.console_tail.pop_front();
                    }
                    self.console_tail.push_back(format!("[{level}] {text}"));
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
    }

    fn tail(mut self) -> Vec<String> {
        self.drain_console();
        self.console_tail.into_iter().collect()
    }
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Run a body's steps and fold the result into an outcome.
///
/// `side` labels any screenshot artifact (`{id}.{side}.png`); artifacts
/// are only written when `artifacts_dir` is given.
pub async fn run_body(
    session: &Session,
    environment: &EnvironmentProfile,
    metadata: &ProbeMetadata,
    steps: &[Step],
    side: &str,
    artifacts_dir: Option<&Path>,
) -> RunOutcome {
    let started = std::time::Instant::now();
    let mut state = RunState::new(session, environment, metadata);
    let result = run_steps(session, &mut state, steps).await;

    let outcome = match result {
        Ok(()) => RunOutcome::pass(),
        Err(WebcompatError::Skipped(reason)) => {
            tracing::info!(probe = %metadata.id, %reason, "probe skipped itself");
            RunOutcome::skip(&reason)
        }
        Err(e) if e.is_infrastructure() => {
            tracing::warn!(probe = %metadata.id, error = %e, "infrastructure fault");
            RunOutcome::error(e.to_string())
        }
        Err(e) => {
            tracing::debug!(probe = %metadata.id, error = %e, "body failed");
            let mut outcome = RunOutcome::fail(e.to_string());
            if let Some(dir) = artifacts_dir {
                if let Some(path) = capture_failure_screenshot(session, dir, &metadata.id, side).await
                {
                    outcome = outcome.with_screenshot(path);
                }
            }
            outcome
        }
    };
    outcome
        .with_elapsed(started.elapsed())
        .with_console_tail(state.tail())
}

async fn capture_failure_screenshot(
    session: &Session,
    dir: &Path,
    probe_id: &str,
    side: &str,
) -> Option<String> {
    let png = match session.screenshot_viewport().await {
        Ok(png) => png,
        Err(e) => {
            tracing::warn!(error = %e, "screenshot unavailable for failure evidence");
            return None;
        }
    };
    let path = dir.join(format!("{probe_id}.{side}.png"));
    match std::fs::write(&path, png) {
        Ok(()) => Some(path.display().to_string()),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "could not write screenshot");
            None
        }
    }
}

// =============================================================================
// STEP DISPATCH
// =============================================================================

fn run_steps<'a>(
    session: &'a Session,
    state: &'a mut RunState<'_>,
    steps: &'a [Step],
) -> BoxFuture<'a, WebcompatResult<()>> {
    async move {
        for step in steps {
            tracing::trace!(?step, "step");
            run_step(session, state, step).await?;
            state.drain_console();
        }
        Ok(())
    }
    .boxed()
}

#[allow(clippy::too_many_lines)]
async fn run_step(
    session: &Session,
    state: &mut RunState<'_>,
    step: &Step,
) -> WebcompatResult<()> {
    match step {
        Step::Navigate {
            url,
            wait,
            timeout_ms,
            expect_console_message,
        } => {
            let mut options = NavigateOptions::new().wait(*wait);
            if let Some(ms) = timeout_ms {
                options = options.timeout(Duration::from_millis(*ms));
            }
            if let Some(substring) = expect_console_message {
                options = options.expect_console_message(substring.clone());
            }
            let destination = url.as_deref().unwrap_or(&state.metadata.url);
            session.navigate(destination, &options).await
        }
        Step::AwaitCss {
            selector,
            displayed,
            timeout_ms,
        } => session
            .await_css(selector, &wait_options(*timeout_ms, *displayed))
            .await
            .map(|_| ()),
        Step::AwaitText {
            text,
            displayed,
            timeout_ms,
        } => session
            .await_text(text, &wait_options(*timeout_ms, *displayed))
            .await
            .map(|_| ()),
        Step::AwaitFirstOf {
            locators,
            timeout_ms,
            on_match,
        } => {
            let winner = session
                .await_first_element_of(locators, &wait_options(*timeout_ms, None))
                .await?;
            apply_match_arm(on_match, winner.index, &winner.element)
        }
        Step::AwaitHidden {
            selector,
            timeout_ms,
        } => {
            session
                .await_element_hidden(selector, &wait_options(*timeout_ms, None))
                .await
        }
        Step::ExpectPresent { selector } => session.find_css(selector).await.map(|_| ()),
        Step::ExpectAbsent { selector } => match session.find_css(selector).await {
            Ok(_) => Err(WebcompatError::assertion(format!(
                "`{selector}` is present but should not be"
            ))),
            Err(WebcompatError::NoSuchElement { .. }) => Ok(()),
            Err(e) => Err(e),
        },
        Step::Click { selector, popups } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            session.click(&element, popups).await
        }
        Step::SoftClick { selector } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            session.soft_click(&element).await
        }
        Step::ApzScroll { selector, dx, dy } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            session.apz_scroll(&element, *dx, *dy).await
        }
        Step::ApzClick { selector } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            session.apz_click(&element).await
        }
        Step::KeyPress { key } => session.key_press(key).await,
        Step::EnterText { selector, text } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            session.enter_text(&element, text).await
        }
        Step::EnterCredential { selector, field } => {
            enter_credential(session, state, selector, *field).await
        }
        Step::SetScreenSize { width, height } => session.set_screen_size(*width, *height).await,
        Step::SwitchToFrame { selector } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            session.switch_to_frame(&element).await
        }
        Step::UsingContext { context, steps } => {
            let inner = run_steps(session, state, steps);
            session.using_context(*context, inner).await
        }
        Step::PreloadScript { source } => session.make_preload_script(source).await,
        Step::DisableAlerts => session.disable_window_alert().await,
        Step::AwaitConsoleMessage {
            substring,
            timeout_ms,
            trigger,
        } => {
            let listener = session.expect_console(substring.clone());
            run_steps(session, state, trigger).await?;
            listener.wait(listener_timeout(*timeout_ms)).await.map(|_| ())
        }
        Step::AwaitNavigationBegins {
            url_substring,
            timeout_ms,
            trigger,
        } => {
            let listener = session.expect_navigation(url_substring.clone());
            run_steps(session, state, trigger).await?;
            listener.wait(listener_timeout(*timeout_ms)).await.map(|_| ())
        }
        Step::AwaitAlert {
            substring,
            timeout_ms,
            trigger,
        } => {
            let listener = session.expect_prompt(substring.clone());
            run_steps(session, state, trigger).await?;
            listener.wait(listener_timeout(*timeout_ms)).await?;
            // Leave no prompt blocking whatever the body does next.
            let _ = session.alert_accept().await;
            Ok(())
        }
        Step::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Ok(())
        }
        Step::SkipIfHeadless { reason } => {
            if state.environment.headless() {
                Err(WebcompatError::skip_environment(reason.clone()))
            } else {
                Ok(())
            }
        }
        Step::ScrollIntoView { selector } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            session.scroll_into_view(&element).await
        }
        Step::HideElements { selector } => session.hide_elements(selector).await,
        Step::RemoveElement { selector } => session.remove_element(selector).await,
        Step::ExpectAttribute {
            selector,
            name,
            equals,
            contains,
        } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            let actual = session.get_attribute(&element, name).await?;
            check_attribute(selector, name, actual.as_deref(), equals.as_deref(), contains.as_deref())
        }
        Step::IsOneSolidColor { selector, expect } => {
            let element = session.await_css(selector, &WaitOptions::new()).await?;
            let solid = helpers::element_is_one_solid_color(session, &element).await?;
            if solid == *expect {
                Ok(())
            } else {
                Err(WebcompatError::assertion(format!(
                    "`{selector}` rendered {}, expected {}",
                    solid_label(solid),
                    solid_label(*expect)
                )))
            }
        }
        Step::PrimeFastclick => helpers::prime_fastclick_detection(session).await,
        Step::TestForFastclick {
            selector,
            expect_active,
        } => test_for_fastclick(session, selector, *expect_active).await,
        Step::TestEntrataBannerHidden { expect_hidden } => {
            let hidden =
                helpers::entrata_banner_hidden(session, helpers::ENTRATA_BANNER_WAIT).await?;
            if hidden {
                Ok(())
            } else {
                Err(WebcompatError::assertion(format!(
                    "unsupported-browser banner is showing{}",
                    expectation_note(!expect_hidden)
                )))
            }
        }
        Step::TestNicochannelLikeSite { url, should_pass } => {
            let works =
                helpers::nicochannel_site_works(session, url, helpers::VIDEO_PLAYBACK_WAIT)
                    .await?;
            if works {
                Ok(())
            } else {
                Err(WebcompatError::assertion(format!(
                    "video playback never started on {url}{}",
                    expectation_note(!should_pass)
                )))
            }
        }
        Step::TestTrendingScrollbar { should_fail } => {
            let overflows =
                helpers::trending_strip_overflows(session, TRENDING_STRIP_WAIT).await?;
            if overflows {
                Err(WebcompatError::assertion(format!(
                    "trending strip grew a horizontal scrollbar{}",
                    expectation_note(*should_fail)
                )))
            } else {
                Ok(())
            }
        }
    }
}

// =============================================================================
// STEP PIECES
// =============================================================================

fn wait_options(timeout_ms: Option<u64>, displayed: Option<bool>) -> WaitOptions {
    let mut options = WaitOptions::new();
    if let Some(ms) = timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }
    if let Some(displayed) = displayed {
        options = options.displayed(displayed);
    }
    options
}

fn listener_timeout(timeout_ms: Option<u64>) -> Duration {
    Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS))
}

/// Resolve a race winner against the declared arms. Positions without
/// an arm continue the body.
fn apply_match_arm(
    arms: &[MatchArm],
    index: usize,
    element: &Element,
) -> WebcompatResult<()> {
    let Some(arm) = arms.iter().find(|arm| arm.index == index) else {
        return Ok(());
    };
    match &arm.then {
        ArmAction::Continue => Ok(()),
        ArmAction::Fail { message } => Err(WebcompatError::assertion(format!(
            "{message} (matched {})",
            element.description()
        ))),
        ArmAction::SkipRegion { reason } => Err(WebcompatError::skip_region(reason.clone())),
        ArmAction::SkipInfrastructure { reason } => {
            Err(WebcompatError::skip_infrastructure(reason.clone()))
        }
    }
}

async fn enter_credential(
    session: &Session,
    state: &RunState<'_>,
    selector: &str,
    field: CredentialField,
) -> WebcompatResult<()> {
    let site = state.metadata.credentials_site.as_deref().ok_or_else(|| {
        WebcompatError::assertion("enter_credential requires the probe to declare credentials_site")
    })?;
    let credential = state
        .environment
        .credentials()
        .get(site)
        .ok_or_else(|| {
            WebcompatError::skip_environment(format!("no credentials configured for {site}"))
        })?;
    let value = match field {
        CredentialField::User => credential.user.clone(),
        CredentialField::Password => credential.password.clone(),
    };
    let element = session.await_css(selector, &WaitOptions::new()).await?;
    session.enter_text(&element, &value).await
}

async fn test_for_fastclick(
    session: &Session,
    selector: &str,
    expect_active: bool,
) -> WebcompatResult<()> {
    let element = session.await_css(selector, &WaitOptions::new()).await?;
    let delivery =
        helpers::tap_delivery(session, &element, helpers::FASTCLICK_TAP_WAIT).await?;
    if delivery.native() {
        return Ok(());
    }
    let how = if delivery.swallowed() {
        "was swallowed"
    } else {
        "went through the fastclick polyfill"
    };
    Err(WebcompatError::assertion(format!(
        "tap on `{selector}` {how}{}",
        expectation_note(expect_active)
    )))
}

fn check_attribute(
    selector: &str,
    name: &str,
    actual: Option<&str>,
    equals: Option<&str>,
    contains: Option<&str>,
) -> WebcompatResult<()> {
    if let Some(expected) = equals {
        if actual != Some(expected) {
            return Err(WebcompatError::assertion(format!(
                "`{selector}` attribute {name} is {actual:?}, expected {expected:?}"
            )));
        }
    }
    if let Some(needle) = contains {
        if !actual.is_some_and(|a| a.contains(needle)) {
            return Err(WebcompatError::assertion(format!(
                "`{selector}` attribute {name} is {actual:?}, expected it to contain {needle:?}"
            )));
        }
    }
    Ok(())
}

fn solid_label(solid: bool) -> &'static str {
    if solid {
        "one solid color"
    } else {
        "varied content"
    }
}

/// Suffix for failures the probe author anticipated on this side.
fn expectation_note(expected: bool) -> &'static str {
    if expected {
        " (expected for this configuration)"
    } else {
        ""
    }
}
