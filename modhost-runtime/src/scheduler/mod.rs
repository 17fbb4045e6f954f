use std::sync::Arc;
use std::time::Duration;

use tracing::Span;

use crate::module::Module;

mod builder;
mod control;
mod handle;
mod run_queue;
mod running;
mod scheduler;
mod shutdown;

pub use builder::SchedulerBuilder;
pub use handle::SchedulerHandle;
pub use scheduler::Scheduler;
pub use shutdown::ShutdownReport;

/// Fixed timing policy of the host.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timeouts {
    /// Firings due longer ago than this are dropped.
    pub stale_after: Duration,
    /// Per-unit bound when joining at shutdown.
    pub join: Duration,
    /// Pause between failed task invocations.
    pub retry_backoff: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(60),
            join: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// A constructed module instance, in load order.
pub(crate) struct LoadedModule {
    pub instance: String,
    pub module: Arc<dyn Module>,
    pub span: Span,
    pub has_crons: bool,
}

#[cfg(test)]
mod tests;
