use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment};
use modhost_runtime::{config_source, CronZone};
use serde::Deserialize;

pub const DEFAULT_SETTINGS_PATH: &str = "/etc/modhost/modhost.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Host-level settings, independent of any module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Directory scanned for module descriptors.
    pub modules_dir: PathBuf,
    /// When set, logs also go to a daily rolling file in this directory.
    pub log_dir: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub log_level: String,
    pub log_format: LogFormat,
    pub cron_zone: CronZone,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("/etc/modhost/modules"),
            log_dir: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            cron_zone: CronZone::Utc,
        }
    }
}

impl HostSettings {
    /// Load settings from `path` (or the default location, which may be absent)
    /// overlaid with `MODHOST_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, Path::new(DEFAULT_SETTINGS_PATH))
    }

    /// Like [`HostSettings::load`], with `default` standing in for the default
    /// location.
    fn load_from(path: Option<&Path>, default: &Path) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path, true),
            None => (default, false),
        };

        let settings: HostSettings = Config::builder()
            .add_source(config_source(path).required(required))
            .add_source(Environment::with_prefix("MODHOST").prefix_separator("_"))
            .build()
            .and_then(|config| config.try_deserialize())
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        Ok(settings)
    }
}
