//! API error type and its JSON rendering.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use xpathai_llama::{ErrorKind, SwitchError};
use xpathai_xpath::XPathError;

/// Seconds a client should wait before retrying a 503.
const RETRY_AFTER_SECS: &str = "5";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Switch(#[from] SwitchError),

    #[error(transparent)]
    XPath(#[from] XPathError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Switch(e) => e.kind().as_str(),
            Self::XPath(e) => e.kind(),
            Self::BadRequest(_) => "bad_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Switch(e) => match e.kind() {
                ErrorKind::ModelNotFound => StatusCode::NOT_FOUND,
                ErrorKind::NotReady => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::StartTimeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::ProcessDied | ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                ErrorKind::Spawn | ErrorKind::InvalidConfig => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::XPath(e) => match e {
                XPathError::EmptyDom | XPathError::MissingTag => StatusCode::BAD_REQUEST,
                XPathError::NoAttributes | XPathError::NotFoundInDom(_) => StatusCode::NOT_FOUND,
                XPathError::Unparsed => StatusCode::BAD_GATEWAY,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!("{} ({}): {}", status, self.kind(), message);
        } else {
            debug!("{} ({}): {}", status, self.kind(), message);
        }

        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": message,
            }
        }));
        if status == StatusCode::SERVICE_UNAVAILABLE {
            (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
