//! Locators used by probe bodies to find elements.
//!
//! Probes locate elements two ways: by CSS selector and by visible text.
//! Text locators are lowered to XPath on the wire because the classic
//! WebDriver surface has no text strategy of its own.

use serde::{Deserialize, Serialize};

/// An element locator.
///
/// Serialized form in probe files is a one-key map: `{ css: "#login" }`
/// or `{ text: "Access Denied" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    /// Match by CSS selector.
    Css {
        /// The selector, e.g. `input[name=PASSWORD]`.
        css: String,
    },
    /// Match by visible text content.
    Text {
        /// Substring of the element's text.
        text: String,
    },
}

impl Locator {
    /// Create a CSS locator.
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            css: selector.into(),
        }
    }

    /// Create a text locator.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// WebDriver locator strategy and value for the wire.
    #[must_use]
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Self::Css { css } => ("css selector", css.clone()),
            Self::Text { text } => ("xpath", text_xpath(text)),
        }
    }

    /// Human-readable form for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Css { css } => format!("css `{css}`"),
            Self::Text { text } => format!("text \"{text}\""),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// XPath matching elements whose own text nodes contain `text`.
fn text_xpath(text: &str) -> String {
    format!("//*[text()[contains(., {})]]", xpath_literal(text))
}

/// Quote a string as an XPath literal, handling embedded quotes.
fn xpath_literal(s: &str) -> String {
    if !s.contains('"') {
        return format!("\"{s}\"");
    }
    if !s.contains('\'') {
        return format!("'{s}'");
    }
    // Both quote kinds present: split on double quotes and rejoin.
    let parts: Vec<String> = s.split('"').map(|p| format!("\"{p}\"")).collect();
    format!("concat({})", parts.join(", '\"', "))
}
