use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use modhost_runtime::linkme::distributed_slice;
use modhost_runtime::{Module, ModuleContext, ModuleEntry, Schedulable, Schedulables, MODULES};
use tracing::info;

const DEFAULT_SCHEDULE: &str = "* * * * *";

/// Logs the system uptime on a configurable schedule.
///
/// Properties: `schedule` (cron expression, default every minute) and
/// `source` (default `/proc/uptime`).
pub struct Uptime {
    schedule: String,
    source: PathBuf,
}

impl Uptime {
    pub fn from_context(context: &ModuleContext) -> Result<Self> {
        let config = context.config();
        Ok(Self {
            schedule: config.get_or("schedule", DEFAULT_SCHEDULE.to_string())?,
            source: PathBuf::from(config.get_or("source", "/proc/uptime".to_string())?),
        })
    }

    pub fn read(&self) -> Result<Duration> {
        let raw = fs::read_to_string(&self.source)
            .with_context(|| format!("failed to read {}", self.source.display()))?;
        parse_uptime(&raw)
    }

    fn report(&self) -> Result<()> {
        let uptime = self.read()?;
        let secs = uptime.as_secs();
        info!(
            uptime_secs = secs,
            "up {}d {:02}h {:02}m",
            secs / 86_400,
            secs % 86_400 / 3_600,
            secs % 3_600 / 60
        );
        Ok(())
    }
}

/// First field of `/proc/uptime`: seconds since boot, with a fractional part.
fn parse_uptime(raw: &str) -> Result<Duration> {
    let field = raw.split_whitespace().next().context("uptime source is empty")?;
    let secs: f64 = field
        .parse()
        .with_context(|| format!("malformed uptime `{field}`"))?;
    Duration::try_from_secs_f64(secs).with_context(|| format!("malformed uptime `{field}`"))
}

// The schedule comes from configuration, so the list is assembled by hand.
impl Schedulable for Uptime {
    fn schedulables(self: Arc<Self>) -> Schedulables {
        let schedule = self.schedule.clone();
        Schedulables::new().cron("report", schedule, move || self.report())
    }
}

impl Module for Uptime {}

fn construct(context: ModuleContext) -> Result<Arc<dyn Module>> {
    Ok(Arc::new(Uptime::from_context(&context)?))
}

#[distributed_slice(MODULES)]
#[linkme(crate = modhost_runtime::linkme)]
static UPTIME: ModuleEntry = ModuleEntry {
    name: "uptime",
    construct,
};

#[cfg(test)]
mod tests {
    use super::*;

    use modhost_runtime::{CancellationToken, ConfigValue, ModuleConfig};
    use tracing::Span;

    fn context(config: ModuleConfig) -> ModuleContext {
        ModuleContext::new("uptime", CancellationToken::new(), Span::none(), config)
    }

    #[test]
    fn test_parse_uptime() {
        let uptime = parse_uptime("93784.52 181234.11\n").unwrap();
        assert_eq!(uptime.as_secs(), 93_784);
        assert!(parse_uptime("").is_err());
        assert!(parse_uptime("soon 1.0").is_err());
    }

    #[test]
    fn test_reads_configured_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("uptime");
        fs::write(&source, "3600.00 7000.00\n").unwrap();

        let module = Uptime::from_context(&context(
            ModuleConfig::new()
                .with("schedule", ConfigValue::String("*/5 * * * *".into()))
                .with("source", ConfigValue::String(source.display().to_string())),
        ))
        .unwrap();
        assert_eq!(module.read().unwrap(), Duration::from_secs(3600));
        assert!(module.report().is_ok());

        let schedulables = Arc::new(module).schedulables();
        assert!(schedulables.tasks().is_empty());
        assert_eq!(schedulables.crons()[0].name(), "report");
        assert_eq!(schedulables.crons()[0].expression(), "*/5 * * * *");
    }

    #[test]
    fn test_default_schedule_and_bad_property() {
        let module = Uptime::from_context(&context(ModuleConfig::new())).unwrap();
        assert_eq!(module.schedule, DEFAULT_SCHEDULE);

        let wrong = context(ModuleConfig::new().with("schedule", ConfigValue::Integer(5)));
        assert!(Uptime::from_context(&wrong).is_err());
    }
}
