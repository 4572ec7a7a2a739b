//! # XPathAI Config
//!
//! Configuration for the XPathAI backend. Loaded once at process start and
//! passed down explicitly; nothing here is hot-reloaded.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
