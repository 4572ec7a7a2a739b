//! XPathAI - local XPath generation backend
//!
//! Main entry point for the XPathAI CLI and server.

mod cli;
mod server;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::warn;

use xpathai_config::{Config, ConfigLoader, ConfigValidator};
use xpathai_llama::{canonical_model_name, ModelCatalog};

use crate::cli::{Cli, Commands, ServeArgs};
use crate::server::{init_tracing, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            let mut config = config;
            args.apply(&mut config);
            init_tracing(&config.logging)?;
            for warning in check_config(&config)? {
                warn!("config {}", warning);
            }
            run_server(config).await
        }
        Commands::Models { format } => list_models(&config, &format),
        Commands::CheckConfig => {
            for warning in check_config(&config)? {
                eprintln!("warning: {}", warning);
            }
            println!("{}: ok", cli.config.display());
            Ok(())
        }
    }
}

/// Validate `config`, returning its warnings. Errors fail with every message.
fn check_config(config: &Config) -> anyhow::Result<Vec<String>> {
    let result = ConfigValidator::validate(config);
    if !result.is_valid() {
        let errors: Vec<_> = result
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }
    Ok(result
        .warnings
        .iter()
        .map(|w| format!("{}: {}", w.path, w.message))
        .collect())
}

fn list_models(config: &Config, format: &str) -> anyhow::Result<()> {
    let catalog = ModelCatalog::new(config.llama.models_dir.clone());
    let models = catalog.list();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&models)?),
        "table" => {
            if models.is_empty() {
                println!("No models in {}", catalog.dir().display());
                return Ok(());
            }
            let default_model = config.llama.default_model.as_deref().map(canonical_model_name);
            println!("{:<48} {:>12}", "MODEL", "SIZE (MB)");
            for model in &models {
                let marker = if default_model.as_deref() == Some(model.name.as_str()) {
                    " (default)"
                } else {
                    ""
                };
                println!(
                    "{:<48} {:>12.1}{}",
                    model.name,
                    model.size_bytes as f64 / (1024.0 * 1024.0),
                    marker
                );
            }
        }
        other => bail!("unknown format '{}', expected table or json", other),
    }
    Ok(())
}
