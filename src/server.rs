//! Server composition and startup.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use xpathai_api::{ApiConfig, ApiServer, AppState};
use xpathai_config::{Config, LlamaConfig, LoggingConfig};
use xpathai_llama::{default_probe, LlamaSupervisor, ModelSwitchboard, SupervisorConfig};

/// Initialize tracing with console and, unless disabled, daily-rolling file output.
///
/// `RUST_LOG` wins over `logging.level`.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let file_layer = if logging.file {
        let log_dir = logging.resolved_dir();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("xpathai")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&log_dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Dropping the guard flushes and stops the writer thread.
        static GUARD: OnceLock<WorkerGuard> = OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

pub(crate) fn supervisor_config(llama: &LlamaConfig) -> SupervisorConfig {
    SupervisorConfig {
        binary: llama.binary.clone(),
        models_dir: llama.models_dir.clone(),
        host: llama.host.clone(),
        port: llama.port,
        ctx_size: llama.ctx_size,
        parallel: llama.parallel,
        extra_args: llama.extra_args.clone(),
        start_timeout: Duration::from_secs(llama.start_timeout_secs),
        stop_grace: Duration::from_secs(llama.stop_grace_secs),
        probe_timeout: Duration::from_millis(llama.probe_timeout_ms),
    }
}

/// Run the API in foreground until SIGINT/SIGTERM, then stop the inference server.
pub(crate) async fn run_server(config: Config) -> anyhow::Result<()> {
    info!("Starting XPathAI v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Inference server: {} at {}, models in {}",
        config.llama.binary.display(),
        config.llama.base_url(),
        config.llama.models_dir.display()
    );

    let acceleration = default_probe(
        config.llama.detect_gpu,
        config.llama.gpu_layers,
        config.llama.main_gpu,
    );
    let supervisor = Arc::new(
        LlamaSupervisor::new(supervisor_config(&config.llama)).with_acceleration(acceleration),
    );
    let switchboard = Arc::new(
        ModelSwitchboard::http(supervisor).with_default_model(config.llama.default_model.clone()),
    );
    let state = Arc::new(AppState::from_config(
        switchboard.clone(),
        &config.generation,
        &config.xpath,
    ));

    // The API is up while the default model loads; requests see 503 until then.
    let preload = switchboard.default_model().map(str::to_string).map(|model| {
        let switchboard = switchboard.clone();
        tokio::spawn(async move {
            match switchboard.ensure_model(&model).await {
                Ok(()) => info!("Default model {} is ready", model),
                Err(e) => error!("Failed to load default model {}: {}", model, e),
            }
        })
    });
    if preload.is_none() {
        info!("No default model configured; waiting for /models/select");
    }

    let server = ApiServer::new(
        ApiConfig::new(config.server.host.clone(), config.server.port),
        state,
    );
    let result = server.run(shutdown_signal()).await;

    if let Some(task) = preload {
        task.abort();
    }
    info!("Stopping inference server");
    switchboard.unload().await;

    result.with_context(|| format!("API server on {}", server.addr()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
