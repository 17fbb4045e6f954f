use super::*;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::{ConfigValue, ModuleConfig, ModuleDescriptor};
use crate::error::{ConfigError, HostError};
use crate::module::ModuleContext;
use crate::registry::{ModuleEntry, ModuleRegistry};
use crate::schedulable;

fn quick() -> Timeouts {
    Timeouts {
        stale_after: Duration::from_secs(60),
        join: Duration::from_millis(300),
        retry_backoff: Duration::from_millis(20),
    }
}

fn registry(entries: &[ModuleEntry]) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    for entry in entries {
        registry.register(*entry).unwrap();
    }
    registry
}

fn descriptor(instance: &str, module: &str) -> ModuleDescriptor {
    ModuleDescriptor::new(instance, module, ModuleConfig::new())
}

static FLAKY_CALLS: AtomicUsize = AtomicUsize::new(0);
static FLAKY_TICKS: AtomicUsize = AtomicUsize::new(0);
static FLAKY_CLOSED: AtomicBool = AtomicBool::new(false);

struct Flaky;

#[schedulable]
impl Flaky {
    #[task]
    fn warm_up(&self) -> anyhow::Result<()> {
        if FLAKY_CALLS.fetch_add(1, Ordering::SeqCst) < 2 {
            anyhow::bail!("still cold");
        }
        Ok(())
    }

    #[cron("* * * * * *")]
    fn tick(&self) {
        FLAKY_TICKS.fetch_add(1, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    fn helper(&self) {}
}

impl Module for Flaky {
    fn close(&self) -> anyhow::Result<()> {
        FLAKY_CLOSED.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn flaky(_: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(Flaky))
}

#[tokio::test]
async fn test_task_retries_and_cron_fires() {
    let scheduler = SchedulerBuilder::new(registry(&[ModuleEntry {
        name: "flaky",
        construct: flaky,
    }]))
    .descriptor(descriptor("flaky", "flaky"))
    .timeouts(quick())
    .build()
    .unwrap();
    assert_eq!(scheduler.module_count(), 1);
    assert_eq!(scheduler.task_count(), 1);
    assert_eq!(scheduler.cron_count(), 1);

    let handle = scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(2300)).await;
    let report = handle.shutdown().await;

    assert_eq!(FLAKY_CALLS.load(Ordering::SeqCst), 3);
    assert!(FLAKY_TICKS.load(Ordering::SeqCst) >= 1);
    assert!(report.is_clean());
    assert!(report.joined.contains(&"flaky::warm_up".to_string()));
    assert_eq!(report.closed, vec!["flaky".to_string()]);
    assert!(FLAKY_CLOSED.load(Ordering::SeqCst));
}

static STUCK_CLOSED: AtomicBool = AtomicBool::new(false);
static COOPERATIVE_CLOSED: AtomicBool = AtomicBool::new(false);

struct Stuck;

#[schedulable]
impl Stuck {
    #[task]
    fn hang(&self) {
        std::thread::sleep(Duration::from_millis(1500));
    }
}

impl Module for Stuck {
    fn close(&self) -> anyhow::Result<()> {
        STUCK_CLOSED.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Cooperative {
    cancel: CancellationToken,
}

#[schedulable]
impl Cooperative {
    #[task]
    fn wait(&self) {
        while !self.cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Module for Cooperative {
    fn close(&self) -> anyhow::Result<()> {
        COOPERATIVE_CLOSED.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Idle;

#[schedulable]
impl Idle {}

impl Module for Idle {}

fn stuck(_: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(Stuck))
}

fn cooperative(context: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(Cooperative {
        cancel: context.cancellation().clone(),
    }))
}

fn idle(_: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(Idle))
}

#[tokio::test]
async fn test_shutdown_abandons_stuck_unit_and_skips_its_cleanup() {
    let scheduler = SchedulerBuilder::new(registry(&[
        ModuleEntry { name: "stuck", construct: stuck },
        ModuleEntry { name: "cooperative", construct: cooperative },
        ModuleEntry { name: "idle", construct: idle },
    ]))
    .descriptors(vec![
        descriptor("stuck", "stuck"),
        descriptor("coop", "cooperative"),
        descriptor("idle", "idle"),
    ])
    .timeouts(quick())
    .build()
    .unwrap();

    let handle = scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let begun = Instant::now();
    let report = handle.shutdown().await;
    let elapsed = begun.elapsed();

    assert_eq!(report.abandoned, vec!["stuck::hang".to_string()]);
    assert_eq!(report.joined, vec!["coop::wait".to_string()]);
    assert_eq!(report.closed, vec!["coop".to_string(), "idle".to_string()]);
    assert!(!STUCK_CLOSED.load(Ordering::SeqCst));
    assert!(COOPERATIVE_CLOSED.load(Ordering::SeqCst));
    assert!(elapsed < Duration::from_secs(1), "shutdown took {elapsed:?}");
}

static WATCHER_CLOSED: AtomicBool = AtomicBool::new(false);
static TICKER_CLOSED: AtomicBool = AtomicBool::new(false);

struct Watcher {
    cancel: CancellationToken,
}

#[schedulable]
impl Watcher {
    #[task]
    fn watch(&self) {
        while !self.cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Module for Watcher {
    fn close(&self) -> anyhow::Result<()> {
        WATCHER_CLOSED.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Ticker;

#[schedulable]
impl Ticker {
    #[cron("* * * * * *")]
    fn tick(&self) {}
}

impl Module for Ticker {
    fn close(&self) -> anyhow::Result<()> {
        TICKER_CLOSED.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn watcher(context: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(Watcher {
        cancel: context.cancellation().clone(),
    }))
}

fn ticker(_: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(Ticker))
}

#[tokio::test]
async fn test_shutdown_after_loop_failure_still_joins_tasks() {
    let scheduler = SchedulerBuilder::new(registry(&[
        ModuleEntry { name: "watcher", construct: watcher },
        ModuleEntry { name: "ticker", construct: ticker },
    ]))
    .descriptors(vec![descriptor("watch", "watcher"), descriptor("tick", "ticker")])
    .timeouts(quick())
    .build()
    .unwrap();

    let handle = scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.control.abort();

    let report = handle.shutdown().await;

    assert!(report.is_clean());
    assert_eq!(report.joined, vec!["watch::watch".to_string()]);
    assert_eq!(report.closed, vec!["watch".to_string()]);
    assert!(WATCHER_CLOSED.load(Ordering::SeqCst));
    assert!(!TICKER_CLOSED.load(Ordering::SeqCst));
}

struct NeedsPort {
    port: u16,
}

#[schedulable]
impl NeedsPort {
    #[task]
    fn serve(&self) {
        let _ = self.port;
    }
}

impl Module for NeedsPort {}

fn needs_port(context: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    let port = context.config().require::<u16>("port")?;
    Ok(Arc::new(NeedsPort { port }))
}

struct BadCron;

#[schedulable]
impl BadCron {
    #[cron("61 * * * *")]
    fn never(&self) {}
}

impl Module for BadCron {}

fn bad_cron(_: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(BadCron))
}

fn refuses(_: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    anyhow::bail!("license server unreachable")
}

#[test]
fn test_build_rejects_unknown_module() {
    let result = SchedulerBuilder::new(ModuleRegistry::new())
        .descriptor(descriptor("ghost", "ghost"))
        .build();
    assert!(matches!(result, Err(HostError::UnknownModule { module }) if module == "ghost"));
}

#[test]
fn test_build_skips_disabled_descriptor() {
    let mut disabled = descriptor("ghost", "ghost");
    disabled.enabled = false;
    let scheduler = SchedulerBuilder::new(ModuleRegistry::new())
        .descriptor(disabled)
        .build()
        .unwrap();
    assert_eq!(scheduler.module_count(), 0);
}

#[test]
fn test_build_reports_config_errors() {
    let registry = registry(&[ModuleEntry {
        name: "needs_port",
        construct: needs_port,
    }]);

    let missing = SchedulerBuilder::new(registry.clone())
        .descriptor(descriptor("web", "needs_port"))
        .build();
    match missing {
        Err(HostError::Config {
            instance,
            source: ConfigError::Missing { key },
        }) => {
            assert_eq!(instance, "web");
            assert_eq!(key, "port");
        }
        Err(other) => panic!("Expected Config error, got {other}"),
        Ok(_) => panic!("Expected Config error"),
    }

    let mismatched = SchedulerBuilder::new(registry)
        .descriptor(ModuleDescriptor::new(
            "web",
            "needs_port",
            ModuleConfig::new().with("port", ConfigValue::String("http".into())),
        ))
        .build();
    assert!(matches!(
        mismatched,
        Err(HostError::Config {
            source: ConfigError::TypeMismatch { .. },
            ..
        })
    ));
}

#[test]
fn test_build_reports_module_errors() {
    let result = SchedulerBuilder::new(registry(&[ModuleEntry {
        name: "refuses",
        construct: refuses,
    }]))
    .descriptor(descriptor("license", "refuses"))
    .build();
    match result {
        Err(HostError::Module { instance, error }) => {
            assert_eq!(instance, "license");
            assert_eq!(error.to_string(), "license server unreachable");
        }
        Err(other) => panic!("Expected Module error, got {other}"),
        Ok(_) => panic!("Expected Module error"),
    }
}

#[test]
fn test_build_rejects_invalid_cron() {
    let result = SchedulerBuilder::new(registry(&[ModuleEntry {
        name: "bad_cron",
        construct: bad_cron,
    }]))
    .descriptor(descriptor("bad", "bad_cron"))
    .build();
    match result {
        Err(HostError::InvalidSchedule { method, expression, .. }) => {
            assert_eq!(method, "bad::never");
            assert_eq!(expression, "61 * * * *");
        }
        Err(other) => panic!("Expected InvalidSchedule, got {other}"),
        Ok(_) => panic!("Expected InvalidSchedule"),
    }
}

#[test]
fn test_build_rejects_duplicate_instance() {
    let result = SchedulerBuilder::new(registry(&[ModuleEntry { name: "idle", construct: idle }]))
        .descriptors(vec![descriptor("twin", "idle"), descriptor("twin", "idle")])
        .build();
    assert!(matches!(result, Err(HostError::DuplicateInstance { instance }) if instance == "twin"));
}

struct Busy;

#[schedulable]
impl Busy {
    #[task]
    fn first(&self) {}

    #[cron("*/5 * * * *")]
    fn report(&self) {}

    #[task]
    fn second(&self) {}
}

impl Module for Busy {}

fn busy(_: ModuleContext) -> anyhow::Result<Arc<dyn Module>> {
    Ok(Arc::new(Busy))
}

#[test]
fn test_method_ids_follow_registration_order() {
    let scheduler = SchedulerBuilder::new(registry(&[
        ModuleEntry { name: "busy", construct: busy },
        ModuleEntry { name: "needs_port", construct: needs_port },
    ]))
    .descriptors(vec![
        descriptor("one", "busy"),
        ModuleDescriptor::new(
            "two",
            "needs_port",
            ModuleConfig::new().with("port", ConfigValue::Integer(8080)),
        ),
    ])
    .build()
    .unwrap();

    let tasks: Vec<(usize, &str, usize)> = scheduler
        .tasks
        .iter()
        .map(|job| (job.id.0, job.name.as_str(), job.module))
        .collect();
    assert_eq!(
        tasks,
        vec![(0, "one::first", 0), (1, "one::second", 0), (3, "two::serve", 1)]
    );
    assert_eq!(scheduler.cron_count(), 1);
}
