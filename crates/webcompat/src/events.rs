//! Remote browser events and the BiDi channel that carries them.
//!
//! The classic WebDriver protocol is request/response only. Console
//! output, navigation starts, and user prompts arrive as server-pushed
//! events on the BiDi WebSocket instead. A pump task parses incoming
//! frames and fans events out through an [`EventHub`] broadcast
//! channel, so listeners can be armed before the action that triggers
//! them.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::result::{WebcompatError, WebcompatResult};

/// Broadcast capacity. Late listeners miss earlier events by design;
/// lagging ones drop the oldest.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Deadline for one BiDi command round trip.
const BIDI_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// EVENTS
// =============================================================================

/// An event pushed by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// A console message was logged.
    Console {
        /// Message text.
        text: String,
        /// Log level ("info", "warn", "error", ...).
        level: String,
    },
    /// A top-level navigation started.
    NavigationBegins {
        /// Destination url.
        url: String,
    },
    /// An `alert`, `confirm`, or `prompt` opened.
    UserPrompt {
        /// Prompt text.
        message: String,
        /// Prompt flavor ("alert", "confirm", "prompt").
        prompt_type: String,
    },
}

impl RemoteEvent {
    /// Short tag for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Console { .. } => "console",
            Self::NavigationBegins { .. } => "navigation",
            Self::UserPrompt { .. } => "prompt",
        }
    }

    /// Map a BiDi event frame onto our model. Unknown methods are
    /// dropped.
    #[must_use]
    pub fn from_bidi(method: &str, params: &Value) -> Option<Self> {
        match method {
            "log.entryAdded" => Some(Self::Console {
                text: params["text"].as_str().unwrap_or_default().to_string(),
                level: params["level"].as_str().unwrap_or("info").to_string(),
            }),
            "browsingContext.navigationStarted" => Some(Self::NavigationBegins {
                url: params["url"].as_str().unwrap_or_default().to_string(),
            }),
            "browsingContext.userPromptOpened" => Some(Self::UserPrompt {
                message: params["message"].as_str().unwrap_or_default().to_string(),
                prompt_type: params["type"].as_str().unwrap_or("alert").to_string(),
            }),
            _ => None,
        }
    }
}

// =============================================================================
// HUB
// =============================================================================

/// Fan-out point for remote events.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<RemoteEvent>,
}

impl EventHub {
    /// Create a hub with no subscribers yet.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Events with no subscriber are dropped.
    pub fn emit(&self, event: RemoteEvent) {
        tracing::trace!(kind = event.kind(), "remote event");
        let _ = self.tx.send(event);
    }

    /// Open a new subscription starting from now.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// LISTENERS
// =============================================================================

async fn recv_matching<F, T>(
    rx: &mut broadcast::Receiver<RemoteEvent>,
    timeout: Duration,
    what: String,
    mut filter: F,
) -> WebcompatResult<T>
where
    F: FnMut(&RemoteEvent) -> Option<T>,
{
    let deadline = tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(found) = filter(&event) {
                        return Ok(found);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event listener lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(WebcompatError::transport("remote event stream closed"));
                }
            }
        }
    });
    match deadline.await {
        Ok(result) => result,
        Err(_) => Err(WebcompatError::timeout(what, millis(timeout))),
    }
}

/// Waits for one console message containing a substring.
///
/// Construction is synchronous, so the listener can be armed before
/// the step that triggers the message.
#[derive(Debug)]
pub struct ConsoleListener {
    rx: broadcast::Receiver<RemoteEvent>,
    substring: String,
}

impl ConsoleListener {
    /// Arm a listener on an event subscription.
    #[must_use]
    pub fn new(rx: broadcast::Receiver<RemoteEvent>, substring: impl Into<String>) -> Self {
        Self {
            rx,
            substring: substring.into(),
        }
    }

    /// Wait for the message; returns its full text.
    pub async fn wait(mut self, timeout: Duration) -> WebcompatResult<String> {
        let substring = self.substring.clone();
        recv_matching(
            &mut self.rx,
            timeout,
            format!("console message containing {substring:?}"),
            |event| match event {
                RemoteEvent::Console { text, .. } if text.contains(&substring) => {
                    Some(text.clone())
                }
                _ => None,
            },
        )
        .await
    }
}

/// Waits for a navigation whose destination contains a substring.
#[derive(Debug)]
pub struct NavigationListener {
    rx: broadcast::Receiver<RemoteEvent>,
    url_substring: String,
}

impl NavigationListener {
    /// Arm a listener on an event subscription.
    #[must_use]
    pub fn new(rx: broadcast::Receiver<RemoteEvent>, url_substring: impl Into<String>) -> Self {
        Self {
            rx,
            url_substring: url_substring.into(),
        }
    }

    /// Wait for the navigation; returns the destination url.
    pub async fn wait(mut self, timeout: Duration) -> WebcompatResult<String> {
        let substring = self.url_substring.clone();
        recv_matching(
            &mut self.rx,
            timeout,
            format!("navigation to url containing {substring:?}"),
            |event| match event {
                RemoteEvent::NavigationBegins { url } if url.contains(&substring) => {
                    Some(url.clone())
                }
                _ => None,
            },
        )
        .await
    }

    /// Drain already-arrived events without blocking; returns the first
    /// matching destination, if any.
    pub fn try_match(&mut self) -> Option<String> {
        while let Ok(event) = self.rx.try_recv() {
            if let RemoteEvent::NavigationBegins { url } = event {
                if url.contains(&self.url_substring) {
                    return Some(url);
                }
            }
        }
        None
    }
}

/// Waits for a user prompt, optionally matching its text.
#[derive(Debug)]
pub struct PromptListener {
    rx: broadcast::Receiver<RemoteEvent>,
    substring: Option<String>,
}

impl PromptListener {
    /// Arm a listener on an event subscription.
    #[must_use]
    pub fn new(rx: broadcast::Receiver<RemoteEvent>, substring: Option<String>) -> Self {
        Self { rx, substring }
    }

    /// Wait for the prompt; returns its text.
    pub async fn wait(mut self, timeout: Duration) -> WebcompatResult<String> {
        let substring = self.substring.clone();
        let what = match &substring {
            Some(s) => format!("user prompt containing {s:?}"),
            None => "user prompt".to_string(),
        };
        recv_matching(&mut self.rx, timeout, what, |event| match event {
            RemoteEvent::UserPrompt { message, .. } => match &substring {
                Some(s) if !message.contains(s.as_str()) => None,
                _ => Some(message.clone()),
            },
            _ => None,
        })
        .await
    }
}

// =============================================================================
// BIDI CONNECTION
// =============================================================================

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingMap = Mutex<HashMap<u64, oneshot::Sender<WebcompatResult<Value>>>>;

/// BiDi WebSocket attached to a WebDriver session.
///
/// Commands are id-correlated; everything else on the wire is treated
/// as an event and fed to the hub.
pub struct BidiConnection {
    sink: Mutex<WsSink>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    pump: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for BidiConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BidiConnection").finish_non_exhaustive()
    }
}

impl BidiConnection {
    /// Connect to the session's BiDi endpoint and start the event pump.
    pub async fn connect(ws_url: &str, hub: EventHub) -> WebcompatResult<Self> {
        let (socket, _) = connect_async(ws_url).await.map_err(|e| {
            WebcompatError::transport(format!("BiDi connect to {ws_url} failed: {e}"))
        })?;
        let (sink, stream) = socket.split();
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let pump = tokio::spawn(pump_frames(stream, Arc::clone(&pending), hub));
        tracing::debug!(ws_url, "BiDi channel attached");
        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(1),
            pump,
        })
    }

    /// Send one BiDi command and wait for its result.
    pub async fn send(&self, method: &str, params: Value) -> WebcompatResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = json!({ "id": id, "method": method, "params": params });
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(frame.to_string().into())).await
        };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(WebcompatError::transport(format!(
                "BiDi send of {method} failed: {e}"
            )));
        }

        match tokio::time::timeout(BIDI_COMMAND_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WebcompatError::transport(
                "BiDi channel dropped while awaiting a reply",
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(WebcompatError::timeout(
                    format!("BiDi command {method}"),
                    millis(BIDI_COMMAND_TIMEOUT),
                ))
            }
        }
    }

    /// Close the socket and stop the pump.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        self.pump.abort();
    }
}

impl Drop for BidiConnection {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump_frames(mut stream: WsStream, pending: Arc<PendingMap>, hub: EventHub) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(text.as_str(), &pending, &hub).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "BiDi socket error; pump stopping");
                break;
            }
        }
    }
    // Unblock any callers still waiting on a reply.
    pending.lock().await.clear();
}

async fn handle_frame(text: &str, pending: &PendingMap, hub: &EventHub) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("unparseable BiDi frame dropped");
        return;
    };
    if let Some(id) = frame.get("id").and_then(Value::as_u64) {
        let Some(tx) = pending.lock().await.remove(&id) else {
            return;
        };
        let reply = if frame["type"].as_str() == Some("error") {
            Err(WebcompatError::protocol(
                frame["error"].as_str().unwrap_or("unknown error"),
                frame["message"].as_str().unwrap_or_default(),
            ))
        } else {
            Ok(frame.get("result").cloned().unwrap_or(Value::Null))
        };
        let _ = tx.send(reply);
        return;
    }
    if let Some(method) = frame.get("method").and_then(Value::as_str) {
        if let Some(event) = RemoteEvent::from_bidi(method, &frame["params"]) {
            hub.emit(event);
        }
    }
}
