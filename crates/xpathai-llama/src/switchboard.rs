//! Single entry point for "make model M active, then generate".

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{GenerateError, SwitchError};
use crate::gateway::{Generation, GenerationGateway};
use crate::models::canonical_model_name;
use crate::params::GenerationRequest;
use crate::supervisor::LlamaSupervisor;

/// A request can lose its model to a concurrent swap between ensuring it and
/// entering the read gate; it retries this many times.
const MAX_SWAP_ATTEMPTS: usize = 3;

/// Coordinates model swaps with generations.
///
/// Swaps hold the swap gate exclusively; generations share it. Generations
/// run concurrently with each other but never across a swap.
pub struct ModelSwitchboard {
    supervisor: Arc<LlamaSupervisor>,
    gateway: GenerationGateway,
    swap_gate: RwLock<()>,
    default_model: Option<String>,
}

impl ModelSwitchboard {
    pub fn new(supervisor: Arc<LlamaSupervisor>, gateway: GenerationGateway) -> Self {
        Self {
            supervisor,
            gateway,
            swap_gate: RwLock::new(()),
            default_model: None,
        }
    }

    /// Switchboard with an HTTP gateway to the supervised server.
    pub fn http(supervisor: Arc<LlamaSupervisor>) -> Self {
        let gateway =
            GenerationGateway::http(supervisor.status_cell().clone(), supervisor.base_url());
        Self::new(supervisor, gateway)
    }

    /// Model to load when a request names none and nothing is running.
    pub fn with_default_model(mut self, model: Option<String>) -> Self {
        self.default_model = model.map(|m| canonical_model_name(&m));
        self
    }

    pub fn supervisor(&self) -> &Arc<LlamaSupervisor> {
        &self.supervisor
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    pub fn current_model(&self) -> Option<String> {
        self.supervisor.current_model()
    }

    /// Make `name` the active model.
    ///
    /// Cheap when it already is: one status read, no lock.
    pub async fn ensure_model(&self, name: &str) -> Result<(), SwitchError> {
        let name = canonical_model_name(name);
        if self.supervisor.status().is_ready_with(&name) {
            return Ok(());
        }

        let _gate = self.swap_gate.write().await;
        info!("Switching to model {}", name);
        self.supervisor.start(&name, &[]).await?;
        Ok(())
    }

    /// Generate with `model` (or whatever is loaded, or the default model).
    pub async fn generate(
        &self,
        model: Option<&str>,
        request: &GenerationRequest,
    ) -> Result<Generation, SwitchError> {
        let target = match model {
            Some(name) => Some(canonical_model_name(name)),
            None if !self.supervisor.status().is_ready() => self.default_model.clone(),
            None => None,
        };

        for attempt in 0..MAX_SWAP_ATTEMPTS {
            if let Some(name) = target.as_deref() {
                self.ensure_model(name).await?;
            }

            let _gate = self.swap_gate.read().await;
            if let Some(name) = target.as_deref() {
                if !self.supervisor.status().is_ready_with(name) {
                    debug!("Model {} swapped out before generation (attempt {})", name, attempt + 1);
                    continue;
                }
            }
            return Ok(self.gateway.generate(request).await?);
        }

        Err(GenerateError::NotReady(self.supervisor.status().state).into())
    }

    /// Stop the active model once in-flight generations finish.
    pub async fn unload(&self) {
        let _gate = self.swap_gate.write().await;
        self.supervisor.stop().await;
    }
}

#[cfg(all(test, unix))]
#[path = "switchboard_tests.rs"]
mod tests;
