use std::collections::BTreeSet;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::running::RunningSet;
use super::shutdown::{run_sequencer, ShutdownReport};
use super::LoadedModule;

/// Handle for a running scheduler
/// Used to signal cancellation and run the shutdown sequence
pub struct SchedulerHandle {
    pub(crate) cancel: CancellationToken,
    pub(crate) control: JoinHandle<RunningSet>,
    /// Task units are owned here so they are joined even if the loop dies.
    pub(crate) tasks: RunningSet,
    pub(crate) modules: Vec<LoadedModule>,
    pub(crate) join_timeout: Duration,
}

impl SchedulerHandle {
    /// The token modules observe; cancelling it stops the control loop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel, wait for the control loop to stop, then join every unit and
    /// close the modules.
    pub async fn shutdown(self) -> ShutdownReport {
        info!("Shutting down scheduler");
        self.cancel.cancel();

        let mut running = RunningSet::default();
        let mut tainted = BTreeSet::new();
        match self.control.await {
            Ok(crons) => running.merge(crons),
            Err(e) => {
                // Cron units the loop held are unreachable; their modules stay open.
                error!("scheduler loop terminated abnormally: {e}");
                tainted.extend(
                    self.modules
                        .iter()
                        .enumerate()
                        .filter(|(_, loaded)| loaded.has_crons)
                        .map(|(index, _)| index),
                );
            }
        }
        running.merge(self.tasks);

        let report = run_sequencer(running, &self.modules, tainted, self.join_timeout).await;
        info!(
            joined = report.joined.len(),
            abandoned = report.abandoned.len(),
            closed = report.closed.len(),
            "Scheduler stopped"
        );
        report
    }
}
