use std::path::PathBuf;

use clap::Parser;

/// Load modules from a directory and run their tasks and cron jobs.
#[derive(Debug, Parser)]
#[command(name = "modhost", version, about)]
pub struct Cli {
    /// Settings file (TOML or YAML)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory containing module descriptors; overrides the settings file
    #[arg(short, long, value_name = "DIR")]
    pub modules_dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `modhost_runtime=trace`; overrides the settings file
    #[arg(short, long, value_name = "FILTER")]
    pub log_level: Option<String>,
}
