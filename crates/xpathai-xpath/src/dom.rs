//! DOM cleanup before it goes into a prompt.
//!
//! Captured pages carry scripts, inline styles, SVG blobs and comments that
//! cost tokens without helping the model locate an element. [`sanitize`]
//! re-renders the parsed tree without those, then collapses whitespace and
//! bounds the result.

use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::XPathError;

/// Appended to a DOM cut at the length limit.
pub const TRUNCATION_MARKER: &str = "... (DOM truncated)";

/// Elements dropped together with their content.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "object", "canvas", "audio",
    "video", "meta", "link", "embed",
];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Document wrappers the parser adds; kept only when they carry attributes.
const WRAPPER_TAGS: &[&str] = &["html", "head", "body"];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

fn escape_into(raw: &str, in_attribute: bool, out: &mut String) {
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '<' if !in_attribute => out.push_str("&lt;"),
            '>' if !in_attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn render(element: ElementRef<'_>, out: &mut String) {
    let value = element.value();
    let name = value.name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }

    let bare_wrapper = WRAPPER_TAGS.contains(&name) && value.attrs().next().is_none();
    if !bare_wrapper {
        out.push('<');
        out.push_str(name);
        for (attr, attr_value) in value.attrs() {
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            escape_into(attr_value, true, out);
            out.push('"');
        }
        out.push('>');
        if VOID_TAGS.contains(&name) {
            return;
        }
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => escape_into(text, false, out),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    render(child, out);
                }
            }
            // comments, doctype, processing instructions
            _ => {}
        }
    }

    if !bare_wrapper {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

/// What to do with a DOM longer than the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationPolicy {
    #[default]
    Truncate,
    Warn,
}

/// Cleaned DOM plus what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedDom {
    pub text: String,
    /// Length in chars before the limit was applied.
    pub original_chars: usize,
    pub truncated: bool,
    pub warnings: Vec<String>,
}

pub fn sanitize(
    dom: &str,
    max_chars: usize,
    policy: TruncationPolicy,
) -> Result<SanitizedDom, XPathError> {
    if dom.trim().is_empty() {
        return Err(XPathError::EmptyDom);
    }

    let document = Html::parse_document(dom);
    let mut rendered = String::with_capacity(dom.len());
    render(document.root_element(), &mut rendered);
    let text = WHITESPACE.replace_all(&rendered, " ").trim().to_string();

    if text.is_empty() {
        return Err(XPathError::EmptyDom);
    }

    let original_chars = text.chars().count();
    if max_chars == 0 || original_chars <= max_chars {
        return Ok(SanitizedDom {
            text,
            original_chars,
            truncated: false,
            warnings: Vec::new(),
        });
    }

    match policy {
        TruncationPolicy::Truncate => {
            debug!("DOM truncated from {} to {} chars", original_chars, max_chars);
            let cut = text
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(text.len());
            let mut truncated = text[..cut].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            Ok(SanitizedDom {
                text: truncated,
                original_chars,
                truncated: true,
                warnings: vec![format!(
                    "DOM truncated from {} to {} characters",
                    original_chars, max_chars
                )],
            })
        }
        TruncationPolicy::Warn => Ok(SanitizedDom {
            text,
            original_chars,
            truncated: false,
            warnings: vec![format!(
                "DOM has {} characters, over the {} character limit",
                original_chars, max_chars
            )],
        }),
    }
}
