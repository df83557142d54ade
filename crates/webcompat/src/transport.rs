//! Wire transport: classic WebDriver over HTTP plus the BiDi side
//! channel, behind one trait so tests can script a browser.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};

use crate::events::{BidiConnection, EventHub, RemoteEvent};
use crate::result::{WebcompatError, WebcompatResult};

/// Ceiling for one classic HTTP round trip. Individual waits stay well
/// below this; it only catches a wedged driver process.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// COMMANDS
// =============================================================================

/// HTTP verb of a classic WebDriver command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read state.
    Get,
    /// Act or create.
    Post,
    /// Tear down.
    Delete,
}

impl Method {
    /// Verb string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

/// One classic WebDriver command, path relative to the server root.
#[derive(Debug, Clone)]
pub struct WireCommand {
    /// HTTP verb.
    pub method: Method,
    /// Path such as `/session/{id}/url`.
    pub path: String,
    /// JSON body for POST commands.
    pub body: Option<Value>,
}

impl WireCommand {
    /// A GET command.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// A POST command. WebDriver requires a JSON object body even when
    /// empty.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    /// A DELETE command.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }

    /// History key: `"POST /session/x/url"`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Everything the session façade needs from the wire.
///
/// The live implementation talks to geckodriver; tests swap in
/// [`MockTransport`] and script the browser's half of the
/// conversation.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send a classic command and return the unwrapped `value` field.
    async fn send(&self, command: WireCommand) -> WebcompatResult<Value>;

    /// Send a BiDi command over the attached WebSocket.
    async fn send_bidi(&self, method: &str, params: Value) -> WebcompatResult<Value>;

    /// Attach the BiDi channel advertised by the new-session response.
    async fn attach_bidi(&self, ws_url: &str) -> WebcompatResult<()>;

    /// Subscribe to browser-pushed events, starting from now.
    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent>;

    /// Release wire resources. Does not end the WebDriver session; the
    /// session façade does that explicitly.
    async fn shutdown(&self);
}

// =============================================================================
// LIVE TRANSPORT
// =============================================================================

/// Transport backed by a real WebDriver server.
#[derive(Debug)]
pub struct WebDriverTransport {
    http: reqwest::Client,
    base_url: String,
    hub: EventHub,
    bidi: Mutex<Option<BidiConnection>>,
}

impl WebDriverTransport {
    /// Create a transport for a server root such as
    /// `http://127.0.0.1:4444`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            hub: EventHub::new(),
            bidi: Mutex::new(None),
        }
    }

    /// Server root this transport talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for WebDriverTransport {
    async fn send(&self, command: WireCommand) -> WebcompatResult<Value> {
        let url = format!("{}{}", self.base_url, command.path);
        tracing::trace!(command = %command.describe(), "webdriver command");

        let method = match command.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut request = self.http.request(method, &url).timeout(HTTP_REQUEST_TIMEOUT);
        if let Some(body) = &command.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                WebcompatError::ConnectionRefused {
                    message: format!("cannot reach WebDriver at {}: {e}", self.base_url),
                }
            } else if e.is_timeout() {
                WebcompatError::timeout(command.describe(), HTTP_REQUEST_TIMEOUT.as_secs() * 1000)
            } else {
                WebcompatError::transport(format!("{} failed: {e}", command.describe()))
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            WebcompatError::transport(format!("{} body read failed: {e}", command.describe()))
        })?;
        interpret_body(status, &text)
    }

    async fn send_bidi(&self, method: &str, params: Value) -> WebcompatResult<Value> {
        let bidi = self.bidi.lock().await;
        match bidi.as_ref() {
            Some(connection) => connection.send(method, params).await,
            None => Err(WebcompatError::transport(
                "BiDi channel not attached to this session",
            )),
        }
    }

    async fn attach_bidi(&self, ws_url: &str) -> WebcompatResult<()> {
        let connection = BidiConnection::connect(ws_url, self.hub.clone()).await?;
        *self.bidi.lock().await = Some(connection);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.hub.subscribe()
    }

    async fn shutdown(&self) {
        if let Some(connection) = self.bidi.lock().await.take() {
            connection.close().await;
        }
    }
}

/// Unwrap a WebDriver response body, mapping protocol errors onto our
/// taxonomy.
fn interpret_body(status: reqwest::StatusCode, text: &str) -> WebcompatResult<Value> {
    let Ok(body) = serde_json::from_str::<Value>(text) else {
        return Err(WebcompatError::protocol(
            format!("http {status}"),
            truncate(text, 200),
        ));
    };
    if let Some(kind) = body["value"]["error"].as_str() {
        let message = body["value"]["message"].as_str().unwrap_or(kind);
        return Err(map_webdriver_error(kind, message));
    }
    if !status.is_success() {
        return Err(WebcompatError::protocol(
            format!("http {status}"),
            truncate(text, 200),
        ));
    }
    Ok(body.get("value").cloned().unwrap_or(Value::Null))
}

/// Map a WebDriver error code onto the crate's error taxonomy.
fn map_webdriver_error(kind: &str, message: &str) -> WebcompatError {
    let message = message.to_string();
    match kind {
        "no such element" => WebcompatError::NoSuchElement { message },
        "timeout" | "script timeout" => WebcompatError::timeout(message, 0),
        "element click intercepted" => WebcompatError::ElementClickIntercepted { message },
        "stale element reference" => WebcompatError::StaleElementReference { message },
        "unexpected alert open" => WebcompatError::UnexpectedAlert { text: message },
        "unsupported operation" | "unknown method" | "unknown command" => {
            WebcompatError::UnsupportedOperation { message }
        }
        "invalid session id" => WebcompatError::InvalidSessionId { message },
        _ => WebcompatError::protocol(kind, message),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let cut = text
            .char_indices()
            .take_while(|(i, _)| *i < limit)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &text[..cut])
    }
}

// =============================================================================
// MOCK TRANSPORT
// =============================================================================

/// Session id the mock always hands out.
pub const MOCK_SESSION_ID: &str = "mock-session";

type ResponseQueues = StdMutex<HashMap<String, VecDeque<WebcompatResult<Value>>>>;

/// Scripted transport for unit tests.
///
/// Responses are keyed by history key (`"POST /session/mock-session/url"`,
/// or `"bidi script.addPreloadScript"`). Queued responses pop in order;
/// a defaults map answers when the queue is empty. Every call lands in
/// one history list so tests can assert ordering across the classic and
/// BiDi channels.
#[derive(Debug)]
pub struct MockTransport {
    queues: ResponseQueues,
    defaults: StdMutex<HashMap<String, Value>>,
    absent: StdMutex<HashSet<String>>,
    call_history: StdMutex<Vec<String>>,
    hub: EventHub,
}

impl MockTransport {
    /// A mock that answers `POST /session` with a fixed session id and
    /// Firefox 142, and accepts session teardown.
    #[must_use]
    pub fn new() -> Self {
        let mock = Self {
            queues: StdMutex::new(HashMap::new()),
            defaults: StdMutex::new(HashMap::new()),
            absent: StdMutex::new(HashSet::new()),
            call_history: StdMutex::new(Vec::new()),
            hub: EventHub::new(),
        };
        mock.set_default(
            "POST /session",
            json!({
                "sessionId": MOCK_SESSION_ID,
                "capabilities": { "browserVersion": "142.0", "moz:headless": false }
            }),
        );
        mock.set_default(&format!("DELETE /session/{MOCK_SESSION_ID}"), Value::Null);
        mock
    }

    /// Like [`MockTransport::new`] but the new-session response carries
    /// a BiDi WebSocket url, so the session attaches the channel.
    #[must_use]
    pub fn with_bidi() -> Self {
        let mock = Self::new();
        mock.set_default(
            "POST /session",
            json!({
                "sessionId": MOCK_SESSION_ID,
                "capabilities": {
                    "browserVersion": "142.0",
                    "moz:headless": false,
                    "webSocketUrl": "ws://127.0.0.1:9222/session"
                }
            }),
        );
        mock
    }

    /// Queue one successful response for a key.
    pub fn enqueue_ok(&self, key: &str, value: Value) {
        self.queues
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(Ok(value));
    }

    /// Queue one error response for a key.
    pub fn enqueue_err(&self, key: &str, error: WebcompatError) {
        self.queues
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Install a repeatable fallback answered whenever the queue for
    /// `key` is empty.
    pub fn set_default(&self, key: &str, value: Value) {
        self.defaults
            .lock()
            .unwrap()
            .insert(key.to_string(), value);
    }

    /// Answer every unqueued call on `key` with `NoSuchElement`, so
    /// wait loops can poll an absent element to their deadline.
    pub fn set_default_no_such_element(&self, key: &str) {
        self.absent.lock().unwrap().insert(key.to_string());
    }

    /// Push a browser event to subscribers.
    pub fn emit(&self, event: RemoteEvent) {
        self.hub.emit(event);
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    /// Whether any call starts with `prefix`.
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.call_history
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.starts_with(prefix))
    }

    /// Position of the first call starting with `prefix`.
    #[must_use]
    pub fn first_call_index(&self, prefix: &str) -> Option<usize> {
        self.call_history
            .lock()
            .unwrap()
            .iter()
            .position(|c| c.starts_with(prefix))
    }

    fn record(&self, entry: String) {
        self.call_history.lock().unwrap().push(entry);
    }

    fn next_response(&self, key: &str) -> Option<WebcompatResult<Value>> {
        if let Some(queue) = self.queues.lock().unwrap().get_mut(key) {
            if let Some(response) = queue.pop_front() {
                return Some(response);
            }
        }
        if let Some(value) = self.defaults.lock().unwrap().get(key) {
            return Some(Ok(value.clone()));
        }
        if self.absent.lock().unwrap().contains(key) {
            return Some(Err(WebcompatError::NoSuchElement {
                message: "scripted absence".into(),
            }));
        }
        None
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, command: WireCommand) -> WebcompatResult<Value> {
        let key = command.describe();
        match &command.body {
            Some(body) => self.record(format!("{key} {body}")),
            None => self.record(key.clone()),
        }
        self.next_response(&key).unwrap_or_else(|| {
            Err(WebcompatError::transport(format!(
                "no scripted response for {key}"
            )))
        })
    }

    async fn send_bidi(&self, method: &str, params: Value) -> WebcompatResult<Value> {
        let key = format!("bidi {method}");
        self.record(format!("{key} {params}"));
        self.next_response(&key).unwrap_or(Ok(Value::Null))
    }

    async fn attach_bidi(&self, ws_url: &str) -> WebcompatResult<()> {
        self.record(format!("attach_bidi {ws_url}"));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.hub.subscribe()
    }

    async fn shutdown(&self) {
        self.record("shutdown".to_string());
    }
}
