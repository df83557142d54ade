//! W3C action payloads for synthesized touch and key input.
//!
//! Touch gestures must go through the actions endpoint so they hit the
//! async pan/zoom code path; scripted `scrollTo` or `click()` calls
//! bypass the behavior many interventions exist to fix.

use serde_json::{json, Value};

use crate::result::{WebcompatError, WebcompatResult};

/// Milliseconds a synthesized tap stays down. Long enough to register,
/// short enough that fastclick-era libraries treat it as a tap.
const TAP_HOLD_MS: u64 = 30;

/// Milliseconds per flick segment.
const FLICK_SEGMENT_MS: u64 = 50;

/// A tap at viewport coordinates.
#[must_use]
pub fn touch_tap_actions(x: i64, y: i64) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "touch-finger",
            "parameters": { "pointerType": "touch" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "x": x, "y": y },
                { "type": "pointerDown", "button": 0 },
                { "type": "pause", "duration": TAP_HOLD_MS },
                { "type": "pointerUp", "button": 0 }
            ]
        }]
    })
}

/// A fast flick from `(x, y)` moving by `(dx, dy)`, split into three
/// segments so the pan/zoom controller sees sustained velocity and
/// applies fling momentum.
#[must_use]
pub fn touch_flick_actions(x: i64, y: i64, dx: i64, dy: i64) -> Value {
    let mut sequence = vec![
        json!({ "type": "pointerMove", "duration": 0, "x": x, "y": y }),
        json!({ "type": "pointerDown", "button": 0 }),
    ];
    for segment in 1..=3_i64 {
        sequence.push(json!({
            "type": "pointerMove",
            "duration": FLICK_SEGMENT_MS,
            // The finger moves opposite to the scroll direction.
            "x": x - dx * segment / 3,
            "y": y - dy * segment / 3,
        }));
    }
    sequence.push(json!({ "type": "pointerUp", "button": 0 }));
    json!({
        "actions": [{
            "type": "pointer",
            "id": "touch-finger",
            "parameters": { "pointerType": "touch" },
            "actions": sequence
        }]
    })
}

/// A key press-and-release of one key.
pub fn key_tap_actions(key: &str) -> WebcompatResult<Value> {
    let value = key_to_value(key)?;
    Ok(json!({
        "actions": [{
            "type": "key",
            "id": "keyboard",
            "actions": [
                { "type": "keyDown", "value": value },
                { "type": "keyUp", "value": value }
            ]
        }]
    }))
}

/// Translate a key name into its WebDriver codepoint. Single
/// characters pass through unchanged.
fn key_to_value(key: &str) -> WebcompatResult<String> {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(c.to_string());
    }
    let code = match key.to_ascii_lowercase().as_str() {
        "enter" | "return" => '\u{E007}',
        "tab" => '\u{E004}',
        "escape" | "esc" => '\u{E00C}',
        "backspace" => '\u{E003}',
        "delete" => '\u{E017}',
        "space" => ' ',
        "arrowup" | "up" => '\u{E013}',
        "arrowdown" | "down" => '\u{E015}',
        "arrowleft" | "left" => '\u{E012}',
        "arrowright" | "right" => '\u{E014}',
        "pageup" => '\u{E00E}',
        "pagedown" => '\u{E00F}',
        "home" => '\u{E011}',
        "end" => '\u{E010}',
        other => {
            return Err(WebcompatError::assertion(format!(
                "unknown key name `{other}`"
            )))
        }
    };
    Ok(code.to_string())
}
