//! Prompt templating.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::element::ElementDescriptor;

pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"Generate an XPath that uniquely identifies this element:
{element}

Within this DOM:
{dom}

Please provide your response as a JSON object with the following keys:
- "primary_xpath": (string) The most reliable XPath.
- "alternative_xpath": (string | null) A backup XPath, or null if not applicable.
- "explanation": (string) A brief explanation of why this approach was chosen.
Ensure the output is a single, valid JSON object only."#;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(element|dom)\}").expect("static regex"));

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_TEMPLATE)
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Builder for an optional override, falling back to the default template.
    pub fn from_override(template: Option<&str>) -> Self {
        match template.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => Self::new(t),
            None => Self::default(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Fill `{element}` and `{dom}`.
    ///
    /// Substitution is a single pass: placeholders appearing inside the
    /// element or DOM text are left alone.
    pub fn build(&self, element: &ElementDescriptor, dom: &str) -> String {
        let rendered = element.render();
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "element" => rendered.clone(),
                _ => dom.to_string(),
            })
            .into_owned()
    }
}
