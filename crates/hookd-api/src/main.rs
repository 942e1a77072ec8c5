//! hookd: build daemon driven by commit notifications.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use hookd_api::{AppState, routes};
use hookd_config::{DaemonConfig, load_daemon_config};
use hookd_executor::ProcessExecutor;
use hookd_scheduler::{BuildPipeline, Dispatcher, JobQueue, ShutdownCoordinator, WorkerPool};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hookd")]
#[command(about = "Builds allow-listed repositories when commit notifications arrive", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the KDL configuration file
    #[arg(short, long, env = "HOOKD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the configured listen address
    #[arg(short, long, env = "HOOKD_LISTEN", global = true)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, env = "HOOKD_LOG_FORMAT", value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Serve,
    /// Parse the configuration, check directories, and exit
    Validate,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<DaemonConfig> {
    let mut config = match &cli.config {
        Some(path) => load_daemon_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            info!("No config file given, using defaults");
            DaemonConfig::default()
        }
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    config
        .check_directories()
        .context("required directories are not usable")?;

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Validate => {
            info!(
                listen = %config.listen,
                workers = config.workers,
                work_dir = %config.work_dir.display(),
                log_dir = %config.log_dir.display(),
                repositories = config.allow.repositories.len(),
                accounts = config.allow.accounts.len(),
                "Configuration is valid"
            );
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: DaemonConfig) -> anyhow::Result<()> {
    if config.allow.repositories.is_empty() || config.allow.accounts.is_empty() {
        warn!("Allow-list is empty, every notification will be rejected");
    }

    let queue = Arc::new(JobQueue::with_capacity(config.queue_capacity));
    let pipeline = Arc::new(BuildPipeline::new(
        Arc::new(ProcessExecutor::new()),
        config.pipeline.clone(),
    ));
    let pool = WorkerPool::start(config.workers, &config.work_dir, queue.clone(), pipeline)
        .context("failed to start worker pool")?;
    let coordinator = Arc::new(ShutdownCoordinator::new(
        queue.clone(),
        pool,
        config.join_timeout,
    ));

    let dispatcher = Arc::new(Dispatcher::new(config.allow.clone(), queue.clone()));
    let state = AppState::new(dispatcher, queue, config.workers);
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let listener = match TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            let coordinator = coordinator.clone();
            tokio::task::spawn_blocking(move || coordinator.terminate()).await?;
            return Err(e).with_context(|| format!("failed to bind {}", config.listen));
        }
    };
    info!("Listening on {}", config.listen);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Server stopped, terminating workers");
    let report = tokio::task::spawn_blocking(move || coordinator.terminate()).await?;
    if let Some(report) = report {
        info!(
            discarded = report.discarded.len(),
            joined = report.join.joined.len(),
            timed_out = report.join.timed_out.len(),
            "Shutdown complete"
        );
    }

    served.context("server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt"),
        _ = terminate => info!("Received terminate signal"),
    }
}
