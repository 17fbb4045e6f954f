use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use modhost_runtime::linkme::distributed_slice;
use modhost_runtime::{schedulable, CancellationToken, Module, ModuleContext, ModuleEntry, MODULES};
use tracing::info;

/// Long-running task that logs a beat every `interval` seconds (default 30)
/// until shutdown.
pub struct Heartbeat {
    interval: Duration,
    cancel: CancellationToken,
    beats: AtomicU64,
}

impl Heartbeat {
    pub fn from_context(context: &ModuleContext) -> Result<Self> {
        let interval = context.config().get_or("interval", 30u64)?;
        anyhow::ensure!(interval > 0, "interval must be at least one second");
        Ok(Self {
            interval: Duration::from_secs(interval),
            cancel: context.cancellation().clone(),
            beats: AtomicU64::new(0),
        })
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    /// Sleep for `interval` in short steps so cancellation is noticed quickly.
    /// Returns false if cancelled first.
    fn pause(&self) -> bool {
        const STEP: Duration = Duration::from_millis(100);
        let mut left = self.interval;
        while !left.is_zero() {
            if self.cancel.is_cancelled() {
                return false;
            }
            let step = left.min(STEP);
            std::thread::sleep(step);
            left -= step;
        }
        !self.cancel.is_cancelled()
    }
}

#[schedulable]
impl Heartbeat {
    #[task]
    fn beat(&self) {
        while self.pause() {
            let count = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
            info!(count, "heartbeat");
        }
    }
}

impl Module for Heartbeat {
    fn close(&self) -> Result<()> {
        info!(beats = self.beats(), "heartbeat stopped");
        Ok(())
    }
}

fn construct(context: ModuleContext) -> Result<Arc<dyn Module>> {
    Ok(Arc::new(Heartbeat::from_context(&context)?))
}

#[distributed_slice(MODULES)]
#[linkme(crate = modhost_runtime::linkme)]
static HEARTBEAT: ModuleEntry = ModuleEntry {
    name: "heartbeat",
    construct,
};
