use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::config::ModuleConfig;
use crate::method::Schedulables;

/// Exposes a module instance's tasks and crons.
///
/// Implemented by `#[schedulable]` on an inherent impl block; the methods
/// marked `#[task]` and `#[cron("...")]` end up in the returned list in
/// declaration order.
pub trait Schedulable {
    fn schedulables(self: Arc<Self>) -> Schedulables;
}

/// A loaded unit of user code hosted by the scheduler.
pub trait Module: Schedulable + Send + Sync + 'static {
    /// Called once during shutdown, after every unit of this module has exited.
    /// Skipped if any of them had to be abandoned.
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Everything the host hands a module at construction time.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    instance: String,
    cancel: CancellationToken,
    span: Span,
    config: ModuleConfig,
}

impl ModuleContext {
    pub fn new(instance: impl Into<String>, cancel: CancellationToken, span: Span, config: ModuleConfig) -> Self {
        Self {
            instance: instance.into(),
            cancel,
            span,
            config,
        }
    }

    /// Instance name, taken from the descriptor file name.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Process-wide shutdown signal. Long-running tasks should return once it fires.
    /// Cancelling it asks the host to shut down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Span that tags everything logged by this module with its instance name.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }
}
