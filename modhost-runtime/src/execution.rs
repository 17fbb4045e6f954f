use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::method::{Job, MethodId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitKind {
    Task,
    Cron,
}

/// A running invocation (cron) or retry loop (task) on the blocking pool.
#[derive(Debug)]
pub(crate) struct ExecutionUnit {
    pub id: MethodId,
    pub module: usize,
    pub name: String,
    pub kind: UnitKind,
    pub handle: JoinHandle<()>,
}

impl ExecutionUnit {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Start a task unit: invoke until one call succeeds, sleeping `backoff` after each failure.
pub(crate) fn spawn_task_unit(job: Job, backoff: Duration) -> ExecutionUnit {
    let (id, module, name) = (job.id, job.module, job.name.clone());
    let handle = tokio::task::spawn_blocking(move || {
        let _entered = job.span.enter();
        info!(task = %job.name, "starting task");
        loop {
            match job.invoke() {
                Ok(()) => {
                    info!(task = %job.name, "task completed");
                    break;
                }
                Err(e) => {
                    error!(task = %job.name, "task failed, retrying in {backoff:?}: {e:#}");
                    std::thread::sleep(backoff);
                }
            }
        }
    });
    ExecutionUnit {
        id,
        module,
        name,
        kind: UnitKind::Task,
        handle,
    }
}

/// Start a cron unit: exactly one invocation for the firing due at `due`.
pub(crate) fn spawn_cron_unit(job: Job, due: DateTime<Utc>) -> ExecutionUnit {
    let (id, module, name) = (job.id, job.module, job.name.clone());
    let handle = tokio::task::spawn_blocking(move || {
        let _entered = job.span.enter();
        debug!(cron = %job.name, %due, "running cron");
        match job.invoke() {
            Ok(()) => debug!(cron = %job.name, "cron finished"),
            Err(e) => error!(cron = %job.name, "cron failed: {e:#}"),
        }
    });
    ExecutionUnit {
        id,
        module,
        name,
        kind: UnitKind::Cron,
        handle,
    }
}
