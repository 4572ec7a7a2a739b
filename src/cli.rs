//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use xpathai_config::Config;

/// XPathAI CLI.
#[derive(Parser)]
#[command(name = "xpathai")]
#[command(about = "Local XPath generation backend for llama.cpp models")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "xpathai.toml",
        env = "XPATHAI_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the HTTP server in foreground (default)
    Serve(ServeArgs),

    /// List model files in the models directory
    Models {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Validate the configuration and exit
    CheckConfig,
}

/// Flags that override the loaded configuration.
#[derive(Args, Default)]
pub(crate) struct ServeArgs {
    /// API host
    #[arg(long)]
    pub host: Option<String>,

    /// API port
    #[arg(long)]
    pub port: Option<u16>,

    /// Model loaded at startup
    #[arg(long)]
    pub model: Option<String>,

    /// Directory holding `.gguf` model files
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Path to the `llama-server` executable
    #[arg(long)]
    pub llama_binary: Option<PathBuf>,
}

impl ServeArgs {
    pub fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(model) = self.model {
            config.llama.default_model = Some(model);
        }
        if let Some(dir) = self.models_dir {
            config.llama.models_dir = dir;
        }
        if let Some(binary) = self.llama_binary {
            config.llama.binary = binary;
        }
    }
}
