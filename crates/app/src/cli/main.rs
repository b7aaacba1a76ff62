//! loopme CLI Application
//!
//! Keeps the recorder's streams on the loopback device and everything else on
//! the real hardware, re-checking whenever a new stream appears.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use loopme_core::domain::{ConfigManager, DeviceTargets, LoopmeConfig, ReconcileError, Reconciler};
use loopme_infra::PulseServer;

const USAGE: &str = "usage: loopme <capture_hw_id> <playback_hw_id> [--config PATH] [-v]";

#[derive(Parser)]
#[command(name = "loopme")]
#[command(about = "Route a recorder's audio through an ALSA loopback device", long_about = None)]
struct Cli {
    /// ALSA id of the physical capture device
    capture_id: String,

    /// ALSA id of the physical playback device
    playback_id: String,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .init();
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<LoopmeConfig> {
    let manager = match path {
        Some(path) => ConfigManager::new(path),
        None => ConfigManager::with_default_path().context("Failed to locate config directory")?,
    };
    Ok(manager.load().await)
}

/// Blocking part: owns the PulseAudio objects, which must stay on one thread.
fn reconcile(config: LoopmeConfig, targets: DeviceTargets, stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let mut server = match PulseServer::connect(&config.app.client_name, config.properties.clone()) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Could not connect to the audio server");
            return Ok(());
        }
    };

    let mut reconciler = Reconciler::from_config(targets, &config.routing);
    let outcome = reconciler.run(&mut server, config.app.poll_interval(), &stop);

    let stats = reconciler.stats();
    info!(
        passes = stats.passes,
        moves_issued = stats.moves_issued,
        moves_failed = stats.moves_failed,
        requests_dropped = stats.requests_dropped,
        "Reconciler finished"
    );

    match outcome {
        Ok(()) => Ok(()),
        Err(ReconcileError::ConnectionFailed) => {
            error!("Connection to the audio server failed");
            Ok(())
        }
        Err(ReconcileError::ConnectionTerminated) => {
            info!("Connection to the audio server terminated");
            Ok(())
        }
        Err(e @ ReconcileError::Server(_)) => {
            error!(error = %e, "Audio server error");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(_) => {
            println!("{}", USAGE);
            return Ok(ExitCode::from(1));
        }
    };

    init_logging(cli.verbose);
    info!(
        "loopme starting: capture device {}, playback device {}",
        cli.capture_id, cli.playback_id
    );

    let config = load_config(cli.config).await?;
    let targets = DeviceTargets::new(cli.capture_id, cli.playback_id);

    let stop = Arc::new(AtomicBool::new(false));
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                ctrl_c_stop.store(true, Ordering::Relaxed);
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    tokio::task::spawn_blocking(move || reconcile(config, targets, stop))
        .await
        .context("Reconciler thread panicked")??;

    info!("loopme stopped");
    Ok(ExitCode::SUCCESS)
}
