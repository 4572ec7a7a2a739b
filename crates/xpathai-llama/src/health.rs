//! Liveness probing of the inference server.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::trace;

/// Classification of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Model loaded, accepting requests.
    Ready,
    /// Server is up but still loading the model.
    Loading,
    /// Any other HTTP status.
    Unavailable(u16),
    /// Nothing listening yet, or the request failed.
    ConnectionFailed(String),
}

/// One probe result with the moment it was taken.
#[derive(Debug, Clone)]
pub struct HealthSample {
    pub outcome: ProbeOutcome,
    pub at: Instant,
}

impl HealthSample {
    pub fn now(outcome: ProbeOutcome) -> Self {
        Self {
            outcome,
            at: Instant::now(),
        }
    }
}

/// A single liveness check.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn probe(&self) -> HealthSample;
}

/// `GET /health` against a llama.cpp server.
///
/// 200 means ready, 503 means the model is still loading.
pub struct HttpHealthCheck {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpHealthCheck {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/health", base_url.as_ref().trim_end_matches('/')),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn probe(&self) -> HealthSample {
        let outcome = match self.client.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    ProbeOutcome::Ready
                } else if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                    ProbeOutcome::Loading
                } else {
                    ProbeOutcome::Unavailable(status.as_u16())
                }
            }
            Err(e) => ProbeOutcome::ConnectionFailed(e.to_string()),
        };
        trace!("Health probe {} -> {:?}", self.url, outcome);
        HealthSample::now(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn probe_with_status(status: u16) -> ProbeOutcome {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let check = HttpHealthCheck::new(server.uri(), Duration::from_secs(2));
        check.probe().await.outcome
    }

    #[tokio::test]
    async fn test_ok_is_ready() {
        assert_eq!(probe_with_status(200).await, ProbeOutcome::Ready);
    }

    #[tokio::test]
    async fn test_503_is_loading() {
        assert_eq!(probe_with_status(503).await, ProbeOutcome::Loading);
    }

    #[tokio::test]
    async fn test_other_status_is_unavailable() {
        assert_eq!(probe_with_status(500).await, ProbeOutcome::Unavailable(500));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Port 9 (discard) is essentially never served on test hosts.
        let check = HttpHealthCheck::new("http://127.0.0.1:9", Duration::from_millis(500));
        let sample = check.probe().await;
        assert!(matches!(sample.outcome, ProbeOutcome::ConnectionFailed(_)));
    }

    #[test]
    fn test_url_trailing_slash() {
        let check = HttpHealthCheck::new("http://127.0.0.1:8080/", Duration::from_secs(1));
        assert_eq!(check.url(), "http://127.0.0.1:8080/health");
    }
}
