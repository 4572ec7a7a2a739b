//! Generation against a ready inference server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::completion::{CompletionPayload, CompletionTransport, HttpCompletion, TransportError};
use crate::error::GenerateError;
use crate::params::GenerationRequest;
use crate::state::{ServerState, StatusCell};

/// How long a connection failure waits for the reaper to report a death.
const DEATH_SETTLE: Duration = Duration::from_millis(200);

/// Generated text plus metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub text: String,
    pub model: Option<String>,
    pub elapsed: Duration,
    pub tokens_predicted: Option<u64>,
    pub tokens_evaluated: Option<u64>,
}

/// Issues one completion per call. Never retries.
pub struct GenerationGateway {
    status: StatusCell,
    transport: Arc<dyn CompletionTransport>,
}

impl GenerationGateway {
    pub fn new(status: StatusCell, transport: Arc<dyn CompletionTransport>) -> Self {
        Self { status, transport }
    }

    /// Gateway talking HTTP to `base_url`.
    pub fn http(status: StatusCell, base_url: impl AsRef<str>) -> Self {
        Self::new(status, Arc::new(HttpCompletion::new(base_url)))
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerateError> {
        let before = self.status.snapshot();
        if !before.is_ready() {
            return Err(GenerateError::NotReady(before.state));
        }

        let payload = CompletionPayload::from_request(request);
        let timeout = request.timeout();
        let started = Instant::now();

        let result = tokio::time::timeout(timeout, self.transport.complete(&payload, timeout))
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout(timeout)));

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return Err(self.classify_failure(before.pid, e).await),
        };

        let text = reply.content.trim();
        if text.is_empty() {
            return Err(GenerateError::Upstream(
                "inference server returned an empty completion".to_string(),
            ));
        }

        let elapsed = started.elapsed();
        debug!(
            "Generated {} chars in {:.2}s",
            text.len(),
            elapsed.as_secs_f64()
        );
        Ok(Generation {
            text: text.to_string(),
            model: before.model,
            elapsed,
            tokens_predicted: reply.tokens_predicted,
            tokens_evaluated: reply.tokens_evaluated,
        })
    }

    async fn classify_failure(&self, pid: Option<u32>, error: TransportError) -> GenerateError {
        if matches!(error, TransportError::Connection(_)) {
            // A dropped connection often means the process just died.
            let mut rx = self.status.subscribe();
            let _ = tokio::time::timeout(
                DEATH_SETTLE,
                rx.wait_for(|s| s.state != ServerState::Ready || s.pid != pid),
            )
            .await;
        }

        let after = self.status.snapshot();
        if after.state == ServerState::Dead {
            warn!("Inference server died during generation: {}", error);
            return GenerateError::ProcessDied {
                code: after.exit_code,
            };
        }
        warn!("Generation failed: {}", error);
        GenerateError::Upstream(error.to_string())
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
