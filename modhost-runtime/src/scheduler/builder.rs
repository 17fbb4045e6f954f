use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span};

use super::run_queue::RunQueue;
use super::scheduler::Scheduler;
use super::{LoadedModule, Timeouts};
use crate::config::ModuleDescriptor;
use crate::error::HostError;
use crate::method::{Job, MethodId};
use crate::module::ModuleContext;
use crate::registry::ModuleRegistry;
use crate::schedule::{CronZone, Schedule};

/// Builder for the scheduler
pub struct SchedulerBuilder {
    registry: ModuleRegistry,
    descriptors: Vec<ModuleDescriptor>,
    zone: CronZone,
    cancel: CancellationToken,
    pub(crate) timeouts: Timeouts,
}

impl SchedulerBuilder {
    /// Create a builder resolving module names through `registry`.
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            descriptors: Vec::new(),
            zone: CronZone::default(),
            cancel: CancellationToken::new(),
            timeouts: Timeouts::default(),
        }
    }

    /// Append module instances to load, in order.
    pub fn descriptors(mut self, descriptors: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    pub fn descriptor(mut self, descriptor: ModuleDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Time zone used to evaluate every cron expression.
    pub fn zone(mut self, zone: CronZone) -> Self {
        self.zone = zone;
        self
    }

    /// Use an externally owned cancellation token instead of a fresh one.
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[cfg(test)]
    pub(crate) fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Instantiate every enabled module, collect its tasks and crons and
    /// compute the first due time of each cron.
    ///
    /// Nothing runs yet; any error here is fatal and leaves nothing started.
    pub fn build(self) -> Result<Scheduler, HostError> {
        let started = Utc::now();
        let mut seen = HashSet::new();
        let mut modules = Vec::new();
        let mut tasks = Vec::new();
        let mut crons = Vec::new();
        let mut next_id = 0;

        for descriptor in self.descriptors {
            let ModuleDescriptor {
                instance,
                module: module_name,
                enabled,
                config,
                ..
            } = descriptor;
            if !enabled {
                info!(%instance, "module disabled, skipping");
                continue;
            }
            if !seen.insert(instance.clone()) {
                return Err(HostError::DuplicateInstance { instance });
            }

            let construct = self.registry.resolve(&module_name)?;
            let span = info_span!("module", %instance, module = %module_name);
            let context = ModuleContext::new(instance.clone(), self.cancel.clone(), span.clone(), config);
            let module = span
                .in_scope(|| construct(context))
                .map_err(|e| HostError::from_construct(&instance, e))?;

            let index = modules.len();
            let (task_methods, cron_methods) = Arc::clone(&module).schedulables().into_parts();
            let has_crons = !cron_methods.is_empty();
            info!(
                %instance,
                module = %module_name,
                tasks = task_methods.len(),
                crons = cron_methods.len(),
                "loaded module"
            );

            for task in task_methods {
                let job = Job::from_task(MethodId(next_id), index, &instance, &span, task);
                debug!(task = %job.name, id = %job.id, "registered task");
                tasks.push(job);
                next_id += 1;
            }
            for cron in cron_methods {
                let expression = cron.expression().to_string();
                let job = Job::from_cron(MethodId(next_id), index, &instance, &span, cron);
                let schedule = Schedule::parse(&expression, self.zone, started).map_err(|source| {
                    HostError::InvalidSchedule {
                        method: job.name.clone(),
                        expression: expression.clone(),
                        source,
                    }
                })?;
                debug!(cron = %job.name, id = %job.id, %expression, "registered cron");
                crons.push((job, schedule));
                next_id += 1;
            }

            modules.push(LoadedModule {
                instance,
                module,
                span,
                has_crons,
            });
        }

        let queue = RunQueue::build(crons)?;

        info!(
            modules = modules.len(),
            tasks = tasks.len(),
            crons = queue.len(),
            zone = ?self.zone,
            "Building scheduler"
        );

        Ok(Scheduler {
            modules,
            tasks,
            queue,
            cancel: self.cancel,
            timeouts: self.timeouts,
        })
    }
}
