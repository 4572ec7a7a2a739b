//! # XPathAI API
//!
//! HTTP surface of the XPathAI backend. Handlers are thin: model lifecycle
//! and generation go through the [`ModelSwitchboard`](xpathai_llama::ModelSwitchboard),
//! DOM and response handling through `xpathai-xpath`.

pub mod error;
pub mod http;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use http::routes::create_router;
pub use server::{ApiConfig, ApiServer};
pub use state::{AppState, XPathSettings};
