//! modhost - loads modules from a descriptor directory and runs their tasks
//! and cron jobs until SIGTERM or Ctrl+C.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use modhost_runtime::{load_descriptors, ModuleRegistry, SchedulerBuilder};
use tracing::{error, info, warn};

mod cli;
mod logging;
mod modules;
mod settings;
mod shutdown;

use settings::HostSettings;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let mut settings = match HostSettings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("modhost: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(dir) = cli.modules_dir {
        settings.modules_dir = dir;
    }
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }

    let guard = match logging::init(&settings) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("modhost: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    };

    // Abandoned units may still occupy blocking threads; do not wait for them.
    runtime.shutdown_background();
    info!("modhost exiting");
    drop(guard);
    code
}

async fn run(settings: HostSettings) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        modules_dir = %settings.modules_dir.display(),
        "Starting modhost"
    );

    let registry = ModuleRegistry::linked()?;
    let descriptors = load_descriptors(&settings.modules_dir)?;
    let scheduler = SchedulerBuilder::new(registry)
        .descriptors(descriptors)
        .zone(settings.cron_zone)
        .build()?;

    let cancel = scheduler.cancellation_token();
    let handle = scheduler.start().await;

    let signal = tokio::select! {
        result = shutdown::wait_for_shutdown_signal() => result,
        _ = cancel.cancelled() => {
            info!("shutdown requested by a module");
            Ok(())
        }
    };

    let report = handle.shutdown().await;
    if !report.is_clean() {
        warn!(abandoned = ?report.abandoned, "exiting with units still running");
    }
    signal
}
