//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::schema::Config;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        Self::expand_paths(&mut config);
        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults. Environment
    /// overrides are applied in both cases.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        let mut config = match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Config::default(),
            Err(e) => return Err(e),
        };
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `XPATHAI_*` overrides using the given lookup.
    pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("XPATHAI_HOST") {
            config.server.host = v;
        }
        if let Some(v) = lookup("XPATHAI_PORT") {
            config.server.port = parse_port("XPATHAI_PORT", &v)?;
        }
        if let Some(v) = lookup("XPATHAI_LLAMA_BINARY") {
            config.llama.binary = PathBuf::from(Self::expand_path(&v));
        }
        if let Some(v) = lookup("XPATHAI_MODELS_DIR") {
            config.llama.models_dir = PathBuf::from(Self::expand_path(&v));
        }
        if let Some(v) = lookup("XPATHAI_LLAMA_PORT") {
            config.llama.port = parse_port("XPATHAI_LLAMA_PORT", &v)?;
        }
        if let Some(v) = lookup("XPATHAI_DEFAULT_MODEL") {
            config.llama.default_model = if v.is_empty() { None } else { Some(v) };
        }
        Ok(())
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    fn expand_paths(config: &mut Config) {
        let expand = |p: &Path| PathBuf::from(Self::expand_path(&p.to_string_lossy()));
        config.llama.binary = expand(&config.llama.binary);
        config.llama.models_dir = expand(&config.llama.models_dir);
        if let Some(dir) = config.logging.dir.as_deref() {
            config.logging.dir = Some(expand(dir));
        }
    }

    /// Expand shell-style paths (e.g., `~/models`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

fn parse_port(field: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("expected a port number, got '{}'", value),
    })
}
