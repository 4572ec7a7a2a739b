//! # XPathAI XPath
//!
//! Text-level helpers around XPath generation:
//!
//! - [`dom`]: strip scripts, styles and comments from captured HTML and bound
//!   its size.
//! - [`prompt`]: fill the prompt template with the element and cleaned DOM.
//! - [`heuristic`]: attribute-based XPath without a model.
//! - [`response`]: pull XPaths out of free-form model output.
//! - [`matcher`]: check whether a simple XPath matches something in the DOM.

pub mod dom;
pub mod element;
pub mod error;
pub mod heuristic;
pub mod matcher;
pub mod prompt;
pub mod response;

pub use dom::{sanitize, SanitizedDom, TruncationPolicy};
pub use element::{Attribute, ElementDescriptor};
pub use error::XPathError;
pub use heuristic::{heuristic_xpath, verified_heuristic_xpath};
pub use matcher::{check_xpath, DomMatch};
pub use prompt::{PromptBuilder, DEFAULT_PROMPT_TEMPLATE};
pub use response::{extract_answer, AnswerFormat, Extraction, XPathAnswer};
