//! HTML reduction
//!
//! Turns a fetched profile page into plain text small enough for a model
//! prompt. Boilerplate elements are ignored, the first main-content container
//! wins, and `<body>` is the fallback.

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

use crate::config::ReduceConfig;
use crate::error::ReduceError;

/// Converts raw page content into model input
///
/// Reduction is CPU-only and deterministic, so it is a plain synchronous
/// trait. Implementations must be cheap enough to call from a worker task.
pub trait Reducer: Send + Sync {
    /// Reduce raw content to text
    ///
    /// # Errors
    ///
    /// Returns a [`ReduceError`] when the content is empty or holds no text.
    fn reduce(&self, raw: &str) -> Result<String, ReduceError>;
}

/// Elements whose text never reaches the model
const STRIPPED_TAGS: [&str; 7] = ["script", "style", "header", "footer", "nav", "aside", "form"];

/// Main-content selectors, tried in order before falling back to `<body>`
const CONTAINER_SELECTORS: [&str; 5] = ["main", "article", ".content", "#main", "#content"];

#[allow(clippy::expect_used)]
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern is valid"));

/// scraper-backed reducer
#[derive(Clone, Debug)]
pub struct HtmlReducer {
    max_chars: usize,
    min_chars_warning: usize,
}

impl HtmlReducer {
    /// Create a reducer from configuration
    pub fn new(config: &ReduceConfig) -> Self {
        Self {
            max_chars: config.max_chars,
            min_chars_warning: config.min_chars_warning,
        }
    }

    fn find_container<'a>(document: &'a Html) -> Option<(ElementRef<'a>, &'static str)> {
        for selector_str in CONTAINER_SELECTORS {
            let Ok(selector) = Selector::parse(selector_str) else {
                continue;
            };
            if let Some(found) = document
                .select(&selector)
                .find(|element| !is_stripped(*element))
            {
                return Some((found, selector_str));
            }
        }

        let body = Selector::parse("body").ok()?;
        document.select(&body).next().map(|b| (b, "body"))
    }
}

impl Default for HtmlReducer {
    fn default() -> Self {
        Self::new(&ReduceConfig::default())
    }
}

impl Reducer for HtmlReducer {
    fn reduce(&self, raw: &str) -> Result<String, ReduceError> {
        if raw.trim().is_empty() {
            return Err(ReduceError::EmptyInput);
        }

        let document = Html::parse_document(raw);
        let (container, matched) = Self::find_container(&document).ok_or(ReduceError::NoContainer)?;
        if matched == "body" {
            tracing::debug!("No main content container found, falling back to <body>");
        }

        let text = visible_text(container);
        if text.is_empty() {
            return Err(ReduceError::NoText);
        }

        let text = truncate_chars(text, self.max_chars);
        let chars = text.chars().count();
        if chars < self.min_chars_warning {
            tracing::warn!(
                chars,
                threshold = self.min_chars_warning,
                "Reduced content is very short"
            );
        }

        tracing::debug!(container = matched, chars, "Reduced page content");
        Ok(text)
    }
}

/// Whether the element sits inside (or is) a stripped tag
fn is_stripped(element: ElementRef<'_>) -> bool {
    STRIPPED_TAGS.contains(&element.value().name())
        || element.ancestors().any(|node| {
            node.value()
                .as_element()
                .is_some_and(|e| STRIPPED_TAGS.contains(&e.name()))
        })
}

/// Text of the container, skipping stripped subtrees, joined by single spaces
fn visible_text(container: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in container.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| STRIPPED_TAGS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    WHITESPACE.replace_all(&parts.join(" "), " ").into_owned()
}

/// Cut to at most `max_chars` characters, never splitting a code point
fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            tracing::debug!(max_chars, "Truncating reduced content");
            text[..byte_idx].trim_end().to_string()
        }
        None => text,
    }
}
