//! Configuration validation.

use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_llama(config, &mut result);
        Self::validate_generation(config, &mut result);
        Self::validate_xpath(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_llama(config: &Config, result: &mut ValidationResult) {
        let llama = &config.llama;

        if llama.port == 0 {
            result.add_error(ValidationError::new("llama.port", "Port cannot be 0"));
        }

        if llama.port == config.server.port && llama.host == config.server.host {
            result.add_error(ValidationError::new(
                "llama.port",
                "Inference server port collides with the API server port",
            ));
        }

        if llama.ctx_size == 0 {
            result.add_error(ValidationError::new(
                "llama.ctx_size",
                "ctx_size must be greater than 0",
            ));
        }

        if llama.parallel == 0 {
            result.add_error(ValidationError::new(
                "llama.parallel",
                "parallel must be greater than 0",
            ));
        }

        if llama.start_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "llama.start_timeout_secs",
                "start_timeout_secs must be greater than 0",
            ));
        }

        if !llama.models_dir.is_dir() {
            result.add_warning(ValidationWarning::new(
                "llama.models_dir",
                format!("Models directory does not exist: {:?}", llama.models_dir),
            ));
        }

        if llama.binary.components().count() > 1 && !llama.binary.exists() {
            result.add_warning(ValidationWarning::new(
                "llama.binary",
                format!("Inference server binary not found: {:?}", llama.binary),
            ));
        }

        if let Some(ref model) = llama.default_model {
            let file = if model.to_lowercase().ends_with(".gguf") {
                model.clone()
            } else {
                format!("{}.gguf", model)
            };
            if llama.models_dir.is_dir() && !llama.models_dir.join(&file).is_file() {
                result.add_warning(ValidationWarning::new(
                    "llama.default_model",
                    format!("Default model {} is not in {:?}", file, llama.models_dir),
                ));
            }
        }

        if llama.main_gpu.is_some() && llama.gpu_layers.is_none() {
            result.add_warning(ValidationWarning::new(
                "llama.main_gpu",
                "main_gpu is ignored unless gpu_layers is set",
            ));
        }
    }

    fn validate_generation(config: &Config, result: &mut ValidationResult) {
        let generation = &config.generation;

        if generation.max_tokens == 0 {
            result.add_error(ValidationError::new(
                "generation.max_tokens",
                "max_tokens must be greater than 0",
            ));
        }

        if !(0.0..=2.0).contains(&generation.temperature) {
            result.add_error(ValidationError::new(
                "generation.temperature",
                "temperature must be between 0.0 and 2.0",
            ));
        }

        if !(0.0..=1.0).contains(&generation.top_p) {
            result.add_error(ValidationError::new(
                "generation.top_p",
                "top_p must be between 0.0 and 1.0",
            ));
        }

        if generation.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "generation.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }
    }

    fn validate_xpath(config: &Config, result: &mut ValidationResult) {
        if config.xpath.max_dom_chars == 0 {
            result.add_error(ValidationError::new(
                "xpath.max_dom_chars",
                "max_dom_chars must be greater than 0",
            ));
        }

        if let Some(ref template) = config.xpath.prompt_template {
            if !template.contains("{dom}") || !template.contains("{element}") {
                result.add_warning(ValidationWarning::new(
                    "xpath.prompt_template",
                    "prompt_template should contain both {element} and {dom}",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
