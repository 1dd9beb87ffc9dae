//! imgdrop - content-addressed image upload server
//!
//! Usage:
//!   imgdrop [--config <CONFIG>] [--bind <ADDR>]
//!
//! A default configuration file is written if CONFIG does not exist.

use anyhow::{Context, Result};
use clap::Parser;
use imgdrop::config::Config;
use imgdrop::expiry::{spawn_expiry_worker, ExpiryWorkerConfig};
use imgdrop::server::{self, AppState, UploadSettings};
use imgdrop::vault::open_vault;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "imgdrop")]
#[command(about = "Content-addressed image upload server", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, default_value = "imgdrop.toml")]
    config: PathBuf,

    /// Override the configured bind address (e.g., 127.0.0.1:8080)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, created) = Config::load_or_create(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    // RUST_LOG takes precedence over the configured level
    env_logger::Builder::new()
        .filter_level(config.server.log_filter())
        .parse_default_env()
        .init();

    log::info!("imgdrop v{}", env!("CARGO_PKG_VERSION"));
    if created {
        log::info!("Wrote default configuration to {}", args.config.display());
    } else {
        log::info!("Loaded configuration from {}", args.config.display());
    }

    let addr = config.server.bind_addr()?;
    let policy = config.storage.retention_policy();
    log::info!("  Storage path: {}", config.storage.path);
    log::info!("  Retention: {} day(s)", config.storage.retention_days);
    log::info!("  Ignored: {:?}", policy.ignore);

    let (vault, report) = open_vault(&config.storage.path, policy, config.upload.verify_existing)
        .with_context(|| format!("failed to open storage at {}", config.storage.path))?;
    log::info!(
        "Startup cleanup: {} expired, {} scheduled, {} ignored, {} retrying, {} stale temporaries",
        report.expired,
        report.scheduled,
        report.ignored,
        report.retried,
        report.stale_temps
    );

    let (cancel, worker) = spawn_expiry_worker(vault.clone(), ExpiryWorkerConfig::default());

    let files_dir = config.server.serve_files.then(|| vault.root());
    let state = AppState::new(vault, UploadSettings::from_config(&config.upload));
    let app = server::router(state, &config.server.upload_path, files_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    log::info!("Listening on http://{}{}", addr, config.server.upload_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cancel.cancel();
    if let Err(e) = worker.await {
        log::warn!("Expiry worker ended abnormally: {}", e);
    }
    log::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
