use anyhow::{Context, Result};
use clap::Parser;
use ekm::client::ReaderConfig;
use ekm::daemon::Reader;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ekm-reader")]
#[command(about = "EKM Omnimeter reader - polls meters and appends readings to the pending log")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "ekm.toml")]
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
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
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C"),
        _ = terminate => log::info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let config = ReaderConfig::from_file(&cli.config)?;
    log::info!(
        "Polling {} meter(s) every {}s, writing {}",
        config.meters.len(),
        config.poll_interval_secs,
        config.log_path().display()
    );

    let mut reader = Reader::new(config)?;
    if cli.once {
        let summary = reader.run_cycle().await?;
        log::info!("{} recorded, {} failed", summary.recorded, summary.failed);
        return reader.shutdown().context("Failed to shut down");
    }

    reader.run_until(shutdown_signal()).await
}
