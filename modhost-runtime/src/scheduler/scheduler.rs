use tokio_util::sync::CancellationToken;
use tracing::info;

use super::control::ControlLoop;
use super::handle::SchedulerHandle;
use super::run_queue::RunQueue;
use super::running::RunningSet;
use super::{LoadedModule, Timeouts};
use crate::execution::spawn_task_unit;
use crate::method::Job;

/// Configured scheduler ready to start
/// Every module is loaded and every schedule parsed, but nothing runs yet.
pub struct Scheduler {
    pub(crate) modules: Vec<LoadedModule>,
    pub(crate) tasks: Vec<Job>,
    pub(crate) queue: RunQueue,
    pub(crate) cancel: CancellationToken,
    pub(crate) timeouts: Timeouts,
}

impl Scheduler {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn cron_count(&self) -> usize {
        self.queue.len()
    }

    /// Start every task unit, then the control loop.
    /// Must be called from within a tokio runtime.
    pub async fn start(self) -> SchedulerHandle {
        info!(
            tasks = self.tasks.len(),
            crons = self.queue.len(),
            "Starting scheduler"
        );

        let mut tasks = RunningSet::default();
        for job in self.tasks {
            tasks.insert(spawn_task_unit(job, self.timeouts.retry_backoff));
        }

        let control = tokio::spawn(
            ControlLoop {
                queue: self.queue,
                running: RunningSet::default(),
                cancel: self.cancel.clone(),
                stale_after: self.timeouts.stale_after,
            }
            .run(),
        );

        SchedulerHandle {
            cancel: self.cancel,
            control,
            tasks,
            modules: self.modules,
            join_timeout: self.timeouts.join,
        }
    }
}
