//! Pull XPaths out of model output.
//!
//! Models are asked for a JSON object but answer in whatever shape they
//! like. Extraction tries, in order: JSON (fenced or bare), the numbered
//! "1. Primary XPath: / 2. Alternative XPath:" layout, and finally the first
//! line that looks like an XPath. Output that matches none of these is
//! [`Extraction::Unparsed`] and never passed off as an XPath.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::matcher::{check_xpath, DomMatch};

pub const NO_JSON_EXPLANATION: &str = "No explanation provided in JSON.";

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("static regex")
});

static PRIMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)1\.?\s*(?:Primary|Main)\s*XPath:?[ \t]*([^\n]+)").expect("static regex")
});

static ALTERNATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)2\.?\s*(?:Alternative|Secondary)\s*XPath:?[ \t]*([^\n]+)")
        .expect("static regex")
});

static EXPLANATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:3\.?\s*)?(?:Brief explanation|Explanation|Approach)[^:\n]*:[ \t]*(\S[^\n]*)")
        .expect("static regex")
});

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]*").expect("static regex"));

static LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\*\*)?XPath:(?:\*\*)?\s*(\S.*)$").expect("static regex")
});

/// Which layout the answer was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerFormat {
    Json,
    Structured,
    Line,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XPathAnswer {
    pub primary: String,
    pub alternative: Option<String>,
    pub explanation: Option<String>,
    pub format: AnswerFormat,
}

impl XPathAnswer {
    /// One warning per extracted XPath the DOM definitely does not contain.
    pub fn dom_warnings(&self, dom: &str) -> Vec<String> {
        std::iter::once(("Primary", self.primary.as_str()))
            .chain(self.alternative.as_deref().map(|a| ("Alternative", a)))
            .filter(|(_, xpath)| check_xpath(xpath, dom) == DomMatch::NotFound)
            .map(|(label, xpath)| format!("{} XPath not found in DOM: {}", label, xpath))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Extracted(XPathAnswer),
    Unparsed { raw: String },
}

impl Extraction {
    pub fn answer(&self) -> Option<&XPathAnswer> {
        match self {
            Self::Extracted(answer) => Some(answer),
            Self::Unparsed { .. } => None,
        }
    }
}

fn strip_quotes(s: &str) -> String {
    s.trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Content of the first backtick span, else the quote-stripped text.
fn code_or_text(s: &str) -> String {
    if let Some(start) = s.find('`') {
        let rest = &s[start + 1..];
        if let Some(len) = rest.find('`') {
            return rest[..len].trim().to_string();
        }
    }
    strip_quotes(s)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(strip_quotes)
        .and_then(non_empty)
}

fn from_json(text: &str) -> Option<XPathAnswer> {
    let candidate = match FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => {
            let start = text.find('{')?;
            let end = text.rfind('}')?;
            if end <= start {
                return None;
            }
            &text[start..=end]
        }
    };

    let value: Value = serde_json::from_str(candidate).ok()?;
    let primary = string_field(&value, "primary_xpath")?;
    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(NO_JSON_EXPLANATION)
        .to_string();

    Some(XPathAnswer {
        primary,
        alternative: string_field(&value, "alternative_xpath"),
        explanation: Some(explanation),
        format: AnswerFormat::Json,
    })
}

fn explanation(text: &str) -> Option<String> {
    EXPLANATION
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .and_then(non_empty)
}

fn from_structured(text: &str) -> Option<XPathAnswer> {
    let primary = PRIMARY
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| code_or_text(m.as_str()))
        .and_then(non_empty)?;
    let alternative = ALTERNATIVE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| code_or_text(m.as_str()))
        .and_then(non_empty);

    Some(XPathAnswer {
        primary,
        alternative,
        explanation: explanation(text),
        format: AnswerFormat::Structured,
    })
}

fn looks_like_xpath(line: &str) -> bool {
    (line.starts_with('/') || line.starts_with(".//") || line.starts_with("(/"))
        && line.len() > 5
        && (!line.contains(' ') || line.contains('['))
}

fn from_lines(text: &str) -> Option<XPathAnswer> {
    let unfenced = FENCE.replace_all(text, "");
    let primary = unfenced.lines().find_map(|line| {
        let line = strip_quotes(line);
        if looks_like_xpath(&line) {
            return Some(line);
        }
        LABELED
            .captures(&line)
            .and_then(|c| c.get(1))
            .map(|m| strip_quotes(m.as_str()))
            .filter(|x| looks_like_xpath(x))
    })?;

    Some(XPathAnswer {
        primary,
        alternative: None,
        explanation: explanation(text),
        format: AnswerFormat::Line,
    })
}

pub fn extract_answer(text: &str) -> Extraction {
    let text = text.trim();
    from_json(text)
        .or_else(|| from_structured(text))
        .or_else(|| from_lines(text))
        .map(Extraction::Extracted)
        .unwrap_or_else(|| Extraction::Unparsed {
            raw: text.to_string(),
        })
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
