//! Browser session façade over the wire transport.
//!
//! One [`Session`] owns one WebDriver session. Every operation a probe
//! body can perform lives here: navigation with explicit readiness
//! polling, element waits, touch gestures, preload scripts, context
//! switching, and screenshots. The browser is launched with page load
//! strategy `none`, so readiness is always polled by the client rather
//! than trusted to the driver.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use tokio::time::Instant;

use crate::events::{ConsoleListener, NavigationListener, PromptListener, RemoteEvent};
use crate::locator::Locator;
use crate::result::{WebcompatError, WebcompatResult};
use crate::transport::{Transport, WireCommand};
use crate::wait::{NavigateOptions, NavigationWait, WaitOptions, DEFAULT_WAIT_TIMEOUT_MS};

/// W3C element key in wire payloads.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Click attempts before an intercepted click is given up on.
const CLICK_ATTEMPTS: u32 = 3;

/// BiDi event domains the harness consumes.
const SUBSCRIBED_EVENTS: [&str; 3] = [
    "log.entryAdded",
    "browsingContext.navigationStarted",
    "browsingContext.userPromptOpened",
];

// =============================================================================
// TYPES
// =============================================================================

/// Handle to an element in the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    id: String,
    description: String,
}

impl Element {
    /// Build a handle from a wire id and a locator description.
    #[must_use]
    pub fn from_parts(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }

    /// Wire id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable locator the element was found by.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Wire form for use as a script argument or frame id.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({ ELEMENT_KEY: self.id })
    }
}

/// Firefox script context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserContext {
    /// Privileged browser UI context.
    Chrome,
    /// Page content context. The default.
    Content,
}

impl BrowserContext {
    /// Context string on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Content => "content",
        }
    }
}

/// Winner of an [`Session::await_first_element_of`] race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstMatch {
    /// Position of the winning locator in the race list.
    pub index: usize,
    /// The element it matched.
    pub element: Element,
}

// =============================================================================
// SESSION
// =============================================================================

/// A live browser session.
#[derive(Debug)]
pub struct Session {
    transport: Arc<dyn Transport>,
    session_id: String,
    browser_version: String,
}

impl Session {
    /// Open a session with the given `alwaysMatch` capabilities.
    ///
    /// When the server advertises a BiDi WebSocket url, the event
    /// channel is attached and the harness's event domains subscribed
    /// before any command runs.
    pub async fn create(
        transport: Arc<dyn Transport>,
        capabilities: Value,
    ) -> WebcompatResult<Self> {
        let value = transport
            .send(WireCommand::post(
                "/session",
                json!({ "capabilities": { "alwaysMatch": capabilities } }),
            ))
            .await?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| {
                WebcompatError::protocol("session", "new-session response without sessionId")
            })?
            .to_string();
        let browser_version = value["capabilities"]["browserVersion"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if let Some(ws_url) = value["capabilities"]["webSocketUrl"].as_str() {
            transport.attach_bidi(ws_url).await?;
            transport
                .send_bidi("session.subscribe", json!({ "events": SUBSCRIBED_EVENTS }))
                .await?;
        }

        tracing::debug!(session_id, browser_version, "session created");
        Ok(Self {
            transport,
            session_id,
            browser_version,
        })
    }

    /// WebDriver session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Browser version string from the session capabilities.
    #[must_use]
    pub fn browser_version(&self) -> &str {
        &self.browser_version
    }

    /// Integer major version, when the version string parses.
    #[must_use]
    pub fn browser_major(&self) -> Option<u32> {
        self.browser_version
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
    }

    /// End the session and release the wire.
    pub async fn close(&self) -> WebcompatResult<()> {
        let result = self
            .transport
            .send(WireCommand::delete(format!("/session/{}", self.session_id)))
            .await;
        self.transport.shutdown().await;
        result.map(|_| ())
    }

    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{suffix}", self.session_id)
    }

    async fn send(&self, command: WireCommand) -> WebcompatResult<Value> {
        self.transport.send(command).await
    }

    // =========================================================================
    // NAVIGATION
    // =========================================================================

    /// Navigate and wait for the requested readiness.
    ///
    /// Readiness is polled via `document.readyState`. If the page kicks
    /// off its own navigation elsewhere before readiness is reached,
    /// the call fails with [`WebcompatError::NavigationAborted`].
    pub async fn navigate(&self, url: &str, options: &NavigateOptions) -> WebcompatResult<()> {
        let console = options
            .expect_console_message
            .as_ref()
            .map(|substring| ConsoleListener::new(self.transport.subscribe(), substring.clone()));
        let mut foreign_nav = self.transport.subscribe();

        self.send(WireCommand::post(self.path("/url"), json!({ "url": url })))
            .await?;

        if options.wait != NavigationWait::None {
            let deadline = Instant::now() + options.timeout;
            loop {
                while let Ok(event) = foreign_nav.try_recv() {
                    if let RemoteEvent::NavigationBegins { url: destination } = event {
                        if destination != url && destination != "about:blank" {
                            tracing::debug!(destination, "navigation aborted by the page");
                            return Err(WebcompatError::NavigationAborted { url: destination });
                        }
                    }
                }
                let state = self.ready_state().await?;
                if options.wait.is_satisfied_by(&state) {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(WebcompatError::timeout(
                        format!("navigation to {url} (readyState {state})"),
                        millis(options.timeout),
                    ));
                }
                tokio::time::sleep(poll_interval()).await;
            }
        }

        if let Some(listener) = console {
            listener
                .wait(Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS))
                .await?;
        }
        tracing::debug!(url, "navigated");
        Ok(())
    }

    async fn ready_state(&self) -> WebcompatResult<String> {
        let state = self
            .execute_script("return document.readyState;", vec![])
            .await?;
        Ok(state.as_str().unwrap_or_default().to_string())
    }

    /// Current document url.
    pub async fn current_url(&self) -> WebcompatResult<String> {
        let value = self.send(WireCommand::get(self.path("/url"))).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    // =========================================================================
    // FINDING AND WAITING
    // =========================================================================

    /// Find an element right now, or fail with `NoSuchElement`.
    pub async fn find(&self, locator: &Locator) -> WebcompatResult<Element> {
        let (using, value) = locator.strategy();
        let reply = self
            .send(WireCommand::post(
                self.path("/element"),
                json!({ "using": using, "value": value }),
            ))
            .await?;
        let id = reply[ELEMENT_KEY].as_str().ok_or_else(|| {
            WebcompatError::protocol("element", "find response without an element id")
        })?;
        Ok(Element {
            id: id.to_string(),
            description: locator.describe(),
        })
    }

    /// Find by CSS selector right now.
    pub async fn find_css(&self, selector: &str) -> WebcompatResult<Element> {
        self.find(&Locator::css(selector)).await
    }

    /// Find by visible text right now.
    pub async fn find_text(&self, text: &str) -> WebcompatResult<Element> {
        self.find(&Locator::text(text)).await
    }

    /// Wait for a locator, polling until the deadline.
    ///
    /// Deadline expiry reports `NoSuchElement` naming the locator, not
    /// a bare timeout: the element never showed up.
    pub async fn await_locator(
        &self,
        locator: &Locator,
        options: &WaitOptions,
    ) -> WebcompatResult<Element> {
        let deadline = Instant::now() + options.timeout;
        loop {
            match self.probe_locator(locator, options.displayed).await? {
                Some(element) => return Ok(element),
                None => {
                    if Instant::now() >= deadline {
                        let qualifier = match options.displayed {
                            Some(true) => " (displayed)",
                            Some(false) => " (hidden)",
                            None => "",
                        };
                        return Err(WebcompatError::NoSuchElement {
                            message: format!(
                                "{}{qualifier} still absent after {}ms",
                                locator.describe(),
                                millis(options.timeout)
                            ),
                        });
                    }
                    tokio::time::sleep(options.poll_interval).await;
                }
            }
        }
    }

    /// Wait for a CSS selector.
    pub async fn await_css(
        &self,
        selector: &str,
        options: &WaitOptions,
    ) -> WebcompatResult<Element> {
        self.await_locator(&Locator::css(selector), options).await
    }

    /// Wait for an element containing the given text.
    pub async fn await_text(&self, text: &str, options: &WaitOptions) -> WebcompatResult<Element> {
        self.await_locator(&Locator::text(text), options).await
    }

    /// Race several locators; the first to match wins.
    pub async fn await_first_element_of(
        &self,
        locators: &[Locator],
        options: &WaitOptions,
    ) -> WebcompatResult<FirstMatch> {
        let deadline = Instant::now() + options.timeout;
        loop {
            for (index, locator) in locators.iter().enumerate() {
                if let Some(element) = self.probe_locator(locator, options.displayed).await? {
                    return Ok(FirstMatch { index, element });
                }
            }
            if Instant::now() >= deadline {
                let raced = locators
                    .iter()
                    .map(Locator::describe)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(WebcompatError::NoSuchElement {
                    message: format!(
                        "none of [{raced}] appeared within {}ms",
                        millis(options.timeout)
                    ),
                });
            }
            tokio::time::sleep(options.poll_interval).await;
        }
    }

    /// Wait until no displayed element matches the selector. Absence
    /// counts as hidden.
    pub async fn await_element_hidden(
        &self,
        selector: &str,
        options: &WaitOptions,
    ) -> WebcompatResult<()> {
        let locator = Locator::css(selector);
        let deadline = Instant::now() + options.timeout;
        loop {
            match self.probe_locator(&locator, Some(true)).await? {
                None => return Ok(()),
                Some(_) => {
                    if Instant::now() >= deadline {
                        return Err(WebcompatError::timeout(
                            format!("waiting for {} to hide", locator.describe()),
                            millis(options.timeout),
                        ));
                    }
                    tokio::time::sleep(options.poll_interval).await;
                }
            }
        }
    }

    /// One find attempt; absence and visibility mismatch both come back
    /// as `None` so wait loops keep polling.
    async fn probe_locator(
        &self,
        locator: &Locator,
        displayed: Option<bool>,
    ) -> WebcompatResult<Option<Element>> {
        let element = match self.find(locator).await {
            Ok(element) => element,
            Err(WebcompatError::NoSuchElement { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if let Some(want) = displayed {
            let shown = match self.is_displayed(&element).await {
                Ok(shown) => shown,
                // The element can go away between find and the
                // visibility check.
                Err(
                    WebcompatError::StaleElementReference { .. }
                    | WebcompatError::NoSuchElement { .. },
                ) => return Ok(None),
                Err(e) => return Err(e),
            };
            if shown != want {
                return Ok(None);
            }
        }
        Ok(Some(element))
    }

    /// Whether the element is rendered visibly.
    pub async fn is_displayed(&self, element: &Element) -> WebcompatResult<bool> {
        let value = self
            .send(WireCommand::get(
                self.path(&format!("/element/{}/displayed", element.id)),
            ))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    // =========================================================================
    // INTERACTION
    // =========================================================================

    /// Click an element.
    ///
    /// If the click is intercepted by an overlay, each selector in
    /// `popups` is dismissed with a best-effort click and the click is
    /// retried, a bounded number of times.
    pub async fn click(&self, element: &Element, popups: &[String]) -> WebcompatResult<()> {
        let mut last_err = None;
        for attempt in 0..CLICK_ATTEMPTS {
            match self.click_once(element).await {
                Ok(()) => return Ok(()),
                Err(e @ WebcompatError::ElementClickIntercepted { .. }) if !popups.is_empty() => {
                    tracing::debug!(
                        target = %element.description,
                        attempt,
                        "click intercepted; dismissing popups"
                    );
                    for selector in popups {
                        if let Ok(popup) = self.find_css(selector).await {
                            let _ = self.click_once(&popup).await;
                        }
                    }
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            WebcompatError::assertion(format!("click on {} never attempted", element.description))
        }))
    }

    /// Click an element, treating an intercepted click as success.
    pub async fn soft_click(&self, element: &Element) -> WebcompatResult<()> {
        match self.click_once(element).await {
            Ok(()) | Err(WebcompatError::ElementClickIntercepted { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn click_once(&self, element: &Element) -> WebcompatResult<()> {
        self.send(WireCommand::post(
            self.path(&format!("/element/{}/click", element.id)),
            json!({}),
        ))
        .await
        .map(|_| ())
    }

    /// Tap an element with synthesized touch input.
    pub async fn apz_click(&self, element: &Element) -> WebcompatResult<()> {
        let (x, y) = self.element_center(element).await?;
        self.perform_actions(crate::input::touch_tap_actions(x, y))
            .await
    }

    /// Flick-scroll on an element with synthesized touch input, driving
    /// the async pan/zoom path.
    pub async fn apz_scroll(&self, element: &Element, dx: i64, dy: i64) -> WebcompatResult<()> {
        let (x, y) = self.element_center(element).await?;
        self.perform_actions(crate::input::touch_flick_actions(x, y, dx, dy))
            .await
    }

    /// Press and release a named key.
    pub async fn key_press(&self, key: &str) -> WebcompatResult<()> {
        let payload = crate::input::key_tap_actions(key)?;
        self.perform_actions(payload).await
    }

    async fn perform_actions(&self, payload: Value) -> WebcompatResult<()> {
        self.send(WireCommand::post(self.path("/actions"), payload))
            .await?;
        // Release sticky input state so gestures do not bleed into the
        // next action.
        self.send(WireCommand::delete(self.path("/actions")))
            .await
            .map(|_| ())
    }

    async fn element_center(&self, element: &Element) -> WebcompatResult<(i64, i64)> {
        let rect = self
            .send(WireCommand::get(
                self.path(&format!("/element/{}/rect", element.id)),
            ))
            .await?;
        let x = rect["x"].as_f64().unwrap_or(0.0) + rect["width"].as_f64().unwrap_or(0.0) / 2.0;
        let y = rect["y"].as_f64().unwrap_or(0.0) + rect["height"].as_f64().unwrap_or(0.0) / 2.0;
        #[allow(clippy::cast_possible_truncation)]
        Ok((x.round() as i64, y.round() as i64))
    }

    /// Click a field and type text into it.
    pub async fn enter_text(&self, element: &Element, text: &str) -> WebcompatResult<()> {
        self.click_once(element).await?;
        self.send(WireCommand::post(
            self.path(&format!("/element/{}/value", element.id)),
            json!({ "text": text }),
        ))
        .await
        .map(|_| ())
    }

    /// Resize the window.
    pub async fn set_screen_size(&self, width: u32, height: u32) -> WebcompatResult<()> {
        self.send(WireCommand::post(
            self.path("/window/rect"),
            json!({ "width": width, "height": height }),
        ))
        .await
        .map(|_| ())
    }

    // =========================================================================
    // SCRIPTS AND CONTEXT
    // =========================================================================

    /// Run synchronous JavaScript in the page; `arguments` receives the
    /// args.
    pub async fn execute_script(&self, script: &str, args: Vec<Value>) -> WebcompatResult<Value> {
        self.send(WireCommand::post(
            self.path("/execute/sync"),
            json!({ "script": script, "args": args }),
        ))
        .await
    }

    /// Run nested work in another script context, restoring the content
    /// context afterwards even on failure.
    pub async fn using_context<T, F>(
        &self,
        context: BrowserContext,
        action: F,
    ) -> WebcompatResult<T>
    where
        F: std::future::Future<Output = WebcompatResult<T>>,
    {
        self.set_context(context).await?;
        let result = action.await;
        let restored = self.set_context(BrowserContext::Content).await;
        match (result, restored) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    async fn set_context(&self, context: BrowserContext) -> WebcompatResult<()> {
        self.send(WireCommand::post(
            self.path("/moz/context"),
            json!({ "context": context.as_str() }),
        ))
        .await
        .map(|_| ())
    }

    /// Enter the iframe held by `element`.
    pub async fn switch_to_frame(&self, element: &Element) -> WebcompatResult<()> {
        self.send(WireCommand::post(
            self.path("/frame"),
            json!({ "id": element.to_wire() }),
        ))
        .await
        .map(|_| ())
    }

    /// Return to the top document.
    pub async fn switch_to_top(&self) -> WebcompatResult<()> {
        self.send(WireCommand::post(self.path("/frame"), json!({ "id": null })))
            .await
            .map(|_| ())
    }

    /// Register a script that runs in every future document before the
    /// page's own scripts. Survives navigation for the whole session.
    pub async fn make_preload_script(&self, source: &str) -> WebcompatResult<()> {
        self.transport
            .send_bidi(
                "script.addPreloadScript",
                json!({ "functionDeclaration": format!("() => {{ {source} }}") }),
            )
            .await
            .map(|_| ())
    }

    /// Neutralize `alert`, `confirm`, and `prompt` in every future
    /// document.
    pub async fn disable_window_alert(&self) -> WebcompatResult<()> {
        self.make_preload_script(
            "window.alert = () => {}; \
             window.confirm = () => true; \
             window.prompt = () => null;",
        )
        .await
    }

    // =========================================================================
    // LISTENERS AND ALERTS
    // =========================================================================

    /// Raw subscription to the session's remote events.
    #[must_use]
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<RemoteEvent> {
        self.transport.subscribe()
    }

    /// Arm a console listener. Arm before triggering.
    #[must_use]
    pub fn expect_console(&self, substring: impl Into<String>) -> ConsoleListener {
        ConsoleListener::new(self.transport.subscribe(), substring)
    }

    /// Arm a navigation listener. Arm before triggering.
    #[must_use]
    pub fn expect_navigation(&self, url_substring: impl Into<String>) -> NavigationListener {
        NavigationListener::new(self.transport.subscribe(), url_substring)
    }

    /// Arm a user prompt listener. Arm before triggering.
    #[must_use]
    pub fn expect_prompt(&self, substring: Option<String>) -> PromptListener {
        PromptListener::new(self.transport.subscribe(), substring)
    }

    /// Accept the open alert.
    pub async fn alert_accept(&self) -> WebcompatResult<()> {
        self.send(WireCommand::post(self.path("/alert/accept"), json!({})))
            .await
            .map(|_| ())
    }

    /// Dismiss the open alert.
    pub async fn alert_dismiss(&self) -> WebcompatResult<()> {
        self.send(WireCommand::post(self.path("/alert/dismiss"), json!({})))
            .await
            .map(|_| ())
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Attribute value, or `None` when absent.
    pub async fn get_attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> WebcompatResult<Option<String>> {
        let value = self
            .send(WireCommand::get(self.path(&format!(
                "/element/{}/attribute/{name}",
                element.id
            ))))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Rendered text of an element.
    pub async fn element_text(&self, element: &Element) -> WebcompatResult<String> {
        let value = self
            .send(WireCommand::get(
                self.path(&format!("/element/{}/text", element.id)),
            ))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// PNG screenshot of one element.
    pub async fn screenshot_element(&self, element: &Element) -> WebcompatResult<Vec<u8>> {
        let value = self
            .send(WireCommand::get(
                self.path(&format!("/element/{}/screenshot", element.id)),
            ))
            .await?;
        decode_screenshot(&value)
    }

    /// PNG screenshot of the viewport.
    pub async fn screenshot_viewport(&self) -> WebcompatResult<Vec<u8>> {
        let value = self.send(WireCommand::get(self.path("/screenshot"))).await?;
        decode_screenshot(&value)
    }

    /// Scroll an element into the middle of the viewport with plain DOM
    /// scrolling (no pan/zoom involvement).
    pub async fn scroll_into_view(&self, element: &Element) -> WebcompatResult<()> {
        self.execute_script(
            "arguments[0].scrollIntoView({ block: 'center', inline: 'center' });",
            vec![element.to_wire()],
        )
        .await
        .map(|_| ())
    }

    /// Hide every element matching the selector.
    pub async fn hide_elements(&self, selector: &str) -> WebcompatResult<()> {
        self.execute_script(
            "for (const node of document.querySelectorAll(arguments[0])) { \
                 node.style.setProperty('display', 'none', 'important'); \
             }",
            vec![json!(selector)],
        )
        .await
        .map(|_| ())
    }

    /// Remove the first element matching the selector from the DOM.
    pub async fn remove_element(&self, selector: &str) -> WebcompatResult<()> {
        self.execute_script(
            "const node = document.querySelector(arguments[0]); if (node) node.remove();",
            vec![json!(selector)],
        )
        .await
        .map(|_| ())
    }
}

fn poll_interval() -> Duration {
    Duration::from_millis(crate::wait::DEFAULT_POLL_INTERVAL_MS)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn decode_screenshot(value: &Value) -> WebcompatResult<Vec<u8>> {
    let encoded = value.as_str().ok_or_else(|| {
        WebcompatError::protocol("screenshot", "screenshot response was not a string")
    })?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| WebcompatError::protocol("screenshot", format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, MOCK_SESSION_ID};

    async fn session(mock: Arc<MockTransport>) -> Session {
        Session::create(mock, json!({ "acceptInsecureCerts": true }))
            .await
            .unwrap()
    }

    fn quick_wait() -> WaitOptions {
        WaitOptions::new()
            .timeout(Duration::from_millis(80))
            .poll_interval(Duration::from_millis(5))
    }

    fn element_reply(id: &str) -> Value {
        json!({ ELEMENT_KEY: id })
    }

    mod create_tests {
        use super::*;

        #[tokio::test]
        async fn test_create_parses_session_and_version() {
            let mock = Arc::new(MockTransport::new());
            let session = session(Arc::clone(&mock)).await;
            assert_eq!(session.session_id(), MOCK_SESSION_ID);
            assert_eq!(session.browser_version(), "142.0");
            assert_eq!(session.browser_major(), Some(142));
            assert!(!mock.was_called("attach_bidi"));
        }

        #[tokio::test]
        async fn test_create_attaches_bidi_when_advertised() {
            let mock = Arc::new(MockTransport::with_bidi());
            let _session = session(Arc::clone(&mock)).await;
            assert!(mock.was_called("attach_bidi ws://127.0.0.1:9222/session"));
            assert!(mock.was_called("bidi session.subscribe"));
        }

        #[tokio::test]
        async fn test_close_deletes_session_and_shuts_transport() {
            let mock = Arc::new(MockTransport::new());
            let session = session(Arc::clone(&mock)).await;
            session.close().await.unwrap();
            assert!(mock.was_called(&format!("DELETE /session/{MOCK_SESSION_ID}")));
            assert!(mock.was_called("shutdown"));
        }
    }

    mod navigate_tests {
        use super::*;

        fn exec_key() -> String {
            format!("POST /session/{MOCK_SESSION_ID}/execute/sync")
        }

        fn url_key() -> String {
            format!("POST /session/{MOCK_SESSION_ID}/url")
        }

        #[tokio::test]
        async fn test_navigate_polls_ready_state() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(&url_key(), Value::Null);
            mock.enqueue_ok(&exec_key(), json!("loading"));
            mock.enqueue_ok(&exec_key(), json!("interactive"));
            let session = session(Arc::clone(&mock)).await;

            session
                .navigate("https://example.com/", &NavigateOptions::new())
                .await
                .unwrap();

            assert!(mock.was_called(&url_key()));
            // Two polls: "loading" rejected, "interactive" satisfies Load.
            let polls = mock
                .history()
                .iter()
                .filter(|c| c.starts_with(&exec_key()))
                .count();
            assert_eq!(polls, 2);
        }

        #[tokio::test]
        async fn test_navigate_wait_none_skips_polling() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(&url_key(), Value::Null);
            let session = session(Arc::clone(&mock)).await;

            session
                .navigate(
                    "https://example.com/",
                    &NavigateOptions::new().wait(NavigationWait::None),
                )
                .await
                .unwrap();
            assert!(!mock.was_called(&exec_key()));
        }

        #[tokio::test]
        async fn test_navigate_complete_requires_complete() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(&url_key(), Value::Null);
            mock.enqueue_ok(&exec_key(), json!("interactive"));
            mock.set_default(&exec_key(), json!("complete"));
            let session = session(Arc::clone(&mock)).await;

            session
                .navigate(
                    "https://example.com/",
                    &NavigateOptions::new().wait(NavigationWait::Complete),
                )
                .await
                .unwrap();
            let polls = mock
                .history()
                .iter()
                .filter(|c| c.starts_with(&exec_key()))
                .count();
            assert_eq!(polls, 2);
        }

        #[tokio::test]
        async fn test_navigate_aborted_by_foreign_navigation() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(&url_key(), Value::Null);
            mock.set_default(&exec_key(), json!("loading"));
            let session = session(Arc::clone(&mock)).await;

            let opts = NavigateOptions::new().timeout(Duration::from_secs(5));
            let navigate = session.navigate("https://example.com/app", &opts);
            let emit = async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                mock.emit(RemoteEvent::NavigationBegins {
                    url: "https://example.com/unsupported-browser".into(),
                });
            };
            let (result, ()) = tokio::join!(navigate, emit);
            let err = result.unwrap_err();
            assert!(matches!(err, WebcompatError::NavigationAborted { .. }));
            assert!(err.to_string().contains("unsupported-browser"));
        }

        #[tokio::test]
        async fn test_navigate_timeout_names_the_state() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(&url_key(), Value::Null);
            mock.set_default(&exec_key(), json!("loading"));
            let session = session(Arc::clone(&mock)).await;

            let err = session
                .navigate(
                    "https://example.com/",
                    &NavigateOptions::new().timeout(Duration::from_millis(50)),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, WebcompatError::Timeout { .. }));
            assert!(err.to_string().contains("readyState loading"));
        }

        #[tokio::test]
        async fn test_navigate_console_expectation() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(&url_key(), Value::Null);
            mock.set_default(&exec_key(), json!("complete"));
            let session = session(Arc::clone(&mock)).await;

            let opts = NavigateOptions::new().expect_console_message("player ready");
            let navigate = session.navigate("https://example.com/", &opts);
            let emit = async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                mock.emit(RemoteEvent::Console {
                    text: "player ready: v2".into(),
                    level: "info".into(),
                });
            };
            let (result, ()) = tokio::join!(navigate, emit);
            result.unwrap();
        }
    }

    mod wait_tests {
        use super::*;

        fn element_key() -> String {
            format!("POST /session/{MOCK_SESSION_ID}/element")
        }

        #[tokio::test]
        async fn test_await_css_retries_until_found() {
            let mock = Arc::new(MockTransport::new());
            mock.enqueue_err(
                &element_key(),
                WebcompatError::NoSuchElement {
                    message: "not yet".into(),
                },
            );
            mock.enqueue_ok(&element_key(), element_reply("el-1"));
            let session = session(Arc::clone(&mock)).await;

            let element = session.await_css("#login", &quick_wait()).await.unwrap();
            assert_eq!(element.id(), "el-1");
            assert_eq!(element.description(), "css `#login`");
        }

        #[tokio::test]
        async fn test_await_css_deadline_is_no_such_element() {
            let mock = Arc::new(MockTransport::new());
            for _ in 0..40 {
                mock.enqueue_err(
                    &element_key(),
                    WebcompatError::NoSuchElement {
                        message: "absent".into(),
                    },
                );
            }
            let session = session(Arc::clone(&mock)).await;

            let err = session
                .await_css("#never", &quick_wait())
                .await
                .unwrap_err();
            assert!(matches!(err, WebcompatError::NoSuchElement { .. }));
            assert!(err.to_string().contains("css `#never`"));
        }

        #[tokio::test]
        async fn test_await_css_displayed_filter_keeps_polling() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(&element_key(), element_reply("el-2"));
            let displayed_key =
                format!("GET /session/{MOCK_SESSION_ID}/element/el-2/displayed");
            mock.enqueue_ok(&displayed_key, json!(false));
            mock.set_default(&displayed_key, json!(true));
            let session = session(Arc::clone(&mock)).await;

            let element = session
                .await_css("#banner", &quick_wait().displayed(true))
                .await
                .unwrap();
            assert_eq!(element.id(), "el-2");
        }

        #[tokio::test]
        async fn test_await_first_element_of_reports_winner_index() {
            let mock = Arc::new(MockTransport::new());
            // First locator misses, second hits.
            mock.enqueue_err(
                &element_key(),
                WebcompatError::NoSuchElement {
                    message: "no password field".into(),
                },
            );
            mock.enqueue_ok(&element_key(), element_reply("el-err"));
            let session = session(Arc::clone(&mock)).await;

            let race = [
                Locator::css("#password"),
                Locator::text("not supported in your browser"),
            ];
            let winner = session
                .await_first_element_of(&race, &quick_wait())
                .await
                .unwrap();
            assert_eq!(winner.index, 1);
            assert_eq!(winner.element.id(), "el-err");
        }

        #[tokio::test]
        async fn test_find_text_asks_by_xpath() {
            let mock = Arc::new(MockTransport::new());
            mock.enqueue_ok(&element_key(), element_reply("el-3"));
            let session = session(Arc::clone(&mock)).await;

            let element = session.find_text("not supported").await.unwrap();
            assert_eq!(element.description(), "text \"not supported\"");
            assert!(mock.was_called("POST /session/mock-session/element {\"using\":\"xpath\""));
        }

        #[tokio::test]
        async fn test_await_element_hidden_accepts_absence() {
            let mock = Arc::new(MockTransport::new());
            mock.enqueue_err(
                &element_key(),
                WebcompatError::NoSuchElement {
                    message: "gone".into(),
                },
            );
            let session = session(Arc::clone(&mock)).await;
            session
                .await_element_hidden("#spinner", &quick_wait())
                .await
                .unwrap();
        }
    }

    mod interaction_tests {
        use super::*;

        fn click_key(id: &str) -> String {
            format!("POST /session/{MOCK_SESSION_ID}/element/{id}/click")
        }

        #[tokio::test]
        async fn test_click_dismisses_popups_and_retries() {
            let mock = Arc::new(MockTransport::new());
            mock.enqueue_err(
                &click_key("el-target"),
                WebcompatError::ElementClickIntercepted {
                    message: "overlay in the way".into(),
                },
            );
            mock.set_default(&click_key("el-target"), Value::Null);
            mock.set_default(
                &format!("POST /session/{MOCK_SESSION_ID}/element"),
                element_reply("el-popup"),
            );
            mock.set_default(&click_key("el-popup"), Value::Null);
            let session = session(Arc::clone(&mock)).await;

            let target = Element {
                id: "el-target".into(),
                description: "css `#buy`".into(),
            };
            session
                .click(&target, &["#consent-dialog .dismiss".to_string()])
                .await
                .unwrap();

            let popup_click = mock.first_call_index(&click_key("el-popup")).unwrap();
            let target_retry = mock
                .history()
                .iter()
                .enumerate()
                .filter(|(_, c)| c.starts_with(&click_key("el-target")))
                .map(|(i, _)| i)
                .last()
                .unwrap();
            assert!(popup_click < target_retry);
        }

        #[tokio::test]
        async fn test_click_without_popups_fails_fast() {
            let mock = Arc::new(MockTransport::new());
            mock.enqueue_err(
                &click_key("el-x"),
                WebcompatError::ElementClickIntercepted {
                    message: "overlay".into(),
                },
            );
            let session = session(Arc::clone(&mock)).await;
            let target = Element {
                id: "el-x".into(),
                description: "css `#x`".into(),
            };
            let err = session.click(&target, &[]).await.unwrap_err();
            assert!(matches!(err, WebcompatError::ElementClickIntercepted { .. }));
        }

        #[tokio::test]
        async fn test_soft_click_swallows_interception() {
            let mock = Arc::new(MockTransport::new());
            mock.enqueue_err(
                &click_key("el-x"),
                WebcompatError::ElementClickIntercepted {
                    message: "overlay".into(),
                },
            );
            let session = session(Arc::clone(&mock)).await;
            let target = Element {
                id: "el-x".into(),
                description: "css `#x`".into(),
            };
            session.soft_click(&target).await.unwrap();
        }

        #[tokio::test]
        async fn test_apz_scroll_sends_touch_actions_and_releases() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(
                &format!("GET /session/{MOCK_SESSION_ID}/element/el-list/rect"),
                json!({ "x": 0.0, "y": 100.0, "width": 200.0, "height": 400.0 }),
            );
            let actions_key = format!("POST /session/{MOCK_SESSION_ID}/actions");
            mock.set_default(&actions_key, Value::Null);
            mock.set_default(
                &format!("DELETE /session/{MOCK_SESSION_ID}/actions"),
                Value::Null,
            );
            let session = session(Arc::clone(&mock)).await;

            let list = Element {
                id: "el-list".into(),
                description: "css `.trending`".into(),
            };
            session.apz_scroll(&list, 0, 300).await.unwrap();

            let actions = mock.first_call_index(&actions_key).unwrap();
            let release = mock
                .first_call_index(&format!("DELETE /session/{MOCK_SESSION_ID}/actions"))
                .unwrap();
            assert!(actions < release);
            let history = mock.history();
            assert!(history[actions].contains("\"pointerType\":\"touch\""));
        }

        #[tokio::test]
        async fn test_enter_text_clicks_then_types() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(&click_key("el-user"), Value::Null);
            let value_key = format!("POST /session/{MOCK_SESSION_ID}/element/el-user/value");
            mock.set_default(&value_key, Value::Null);
            let session = session(Arc::clone(&mock)).await;

            let field = Element {
                id: "el-user".into(),
                description: "css `#user`".into(),
            };
            session.enter_text(&field, "qa@example.com").await.unwrap();
            assert!(mock.first_call_index(&click_key("el-user")).unwrap()
                < mock.first_call_index(&value_key).unwrap());
        }
    }

    mod script_tests {
        use super::*;

        #[tokio::test]
        async fn test_preload_script_installs_before_navigation() {
            let mock = Arc::new(MockTransport::with_bidi());
            let url_key = format!("POST /session/{MOCK_SESSION_ID}/url");
            mock.set_default(&url_key, Value::Null);
            mock.set_default(
                &format!("POST /session/{MOCK_SESSION_ID}/execute/sync"),
                json!("complete"),
            );
            let session = session(Arc::clone(&mock)).await;

            session
                .make_preload_script("delete window.fastclickBroken;")
                .await
                .unwrap();
            session
                .navigate("https://example.com/", &NavigateOptions::new())
                .await
                .unwrap();

            let preload = mock
                .first_call_index("bidi script.addPreloadScript")
                .unwrap();
            let navigate = mock.first_call_index(&url_key).unwrap();
            assert!(preload < navigate);
        }

        #[tokio::test]
        async fn test_disable_window_alert_overrides_dialog_functions() {
            let mock = Arc::new(MockTransport::with_bidi());
            let session = session(Arc::clone(&mock)).await;
            session.disable_window_alert().await.unwrap();
            let history = mock.history();
            let call = history
                .iter()
                .find(|c| c.starts_with("bidi script.addPreloadScript"))
                .unwrap();
            assert!(call.contains("window.alert"));
            assert!(call.contains("window.confirm"));
            assert!(call.contains("window.prompt"));
        }

        #[tokio::test]
        async fn test_using_context_restores_content_on_failure() {
            let mock = Arc::new(MockTransport::new());
            let context_key = format!("POST /session/{MOCK_SESSION_ID}/moz/context");
            mock.set_default(&context_key, Value::Null);
            let session = session(Arc::clone(&mock)).await;

            let result: WebcompatResult<()> = session
                .using_context(BrowserContext::Chrome, async {
                    Err(WebcompatError::assertion("inner failure"))
                })
                .await;
            assert!(result.is_err());

            let history = mock.history();
            let switches: Vec<_> = history
                .iter()
                .filter(|c| c.starts_with(&context_key))
                .collect();
            assert_eq!(switches.len(), 2);
            assert!(switches[0].contains("chrome"));
            assert!(switches[1].contains("content"));
        }
    }

    mod inspection_tests {
        use super::*;

        #[tokio::test]
        async fn test_screenshot_decodes_base64() {
            let mock = Arc::new(MockTransport::new());
            let png = [0x89_u8, 0x50, 0x4E, 0x47];
            let encoded = base64::engine::general_purpose::STANDARD.encode(png);
            mock.set_default(
                &format!("GET /session/{MOCK_SESSION_ID}/screenshot"),
                json!(encoded),
            );
            let session = session(Arc::clone(&mock)).await;
            assert_eq!(session.screenshot_viewport().await.unwrap(), png);
        }

        #[tokio::test]
        async fn test_get_attribute_absent_is_none() {
            let mock = Arc::new(MockTransport::new());
            mock.set_default(
                &format!("GET /session/{MOCK_SESSION_ID}/element/el/attribute/class"),
                Value::Null,
            );
            let session = session(Arc::clone(&mock)).await;
            let element = Element {
                id: "el".into(),
                description: "css `#x`".into(),
            };
            assert!(session
                .get_attribute(&element, "class")
                .await
                .unwrap()
                .is_none());
        }
    }
}
