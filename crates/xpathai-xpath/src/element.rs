//! The element a caller wants an XPath for.

use serde::{Deserialize, Serialize};

use crate::error::XPathError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Element as captured by the browser: tag, attributes in document order,
/// optional text and outer HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

impl ElementDescriptor {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Lowercased, trimmed tag name.
    pub fn tag_name(&self) -> Result<String, XPathError> {
        let tag = self.tag.trim();
        if tag.is_empty() {
            return Err(XPathError::MissingTag);
        }
        Ok(tag.to_lowercase())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Short HTML-like rendering used in prompts.
    ///
    /// Prefers the captured outer HTML when present.
    pub fn render(&self) -> String {
        if let Some(html) = self.html.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
            return html.to_string();
        }

        let tag = self.tag.trim().to_lowercase();
        let mut out = format!("<{}", tag);
        for attr in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", attr.name, attr.value.replace('"', "&quot;")));
        }
        out.push('>');
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            out.push_str(text);
        }
        out.push_str(&format!("</{}>", tag));
        out
    }
}
