//! HTTP route definitions.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::{handlers, models, monitoring, openai_compat};
use crate::state::AppState;

/// Create the API router.
///
/// ```text
/// GET  /health               - Inference server and process status
/// GET  /livez                - Liveness probe
/// GET  /readyz               - 200 once a model serves, else 503
/// GET  /models               - Model files and the active model
/// POST /models/select        - Load a model
/// POST /models/unload        - Stop the active model
/// POST /generate             - Raw completion
/// POST /generate-xpath       - XPath for an element (AI or heuristic)
/// POST /v1/chat/completions  - OpenAI-compatible chat
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    // Requests come from a browser extension on arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let liveness_route = Router::new().route("/livez", get(monitoring::liveness_probe));

    Router::new()
        .route("/health", get(monitoring::health))
        .route("/readyz", get(monitoring::readiness_probe))
        .route("/models", get(models::list_models))
        .route("/models/select", post(models::select_model))
        .route("/models/unload", post(models::unload_model))
        .route("/generate", post(handlers::generate))
        .route("/generate-xpath", post(handlers::generate_xpath))
        .route("/v1/chat/completions", post(openai_compat::chat_completions))
        .with_state(state)
        .merge(liveness_route)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(all(test, unix))]
#[path = "routes_tests.rs"]
mod tests;
