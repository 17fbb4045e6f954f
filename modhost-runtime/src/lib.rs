//! modhost runtime - loads modules, runs their tasks and crons.
//!
//! A module is user code that exposes long-lived *tasks* (started once, retried
//! until they succeed) and *crons* (invoked at the due times of a cron
//! expression). The [`SchedulerBuilder`] instantiates modules from descriptors,
//! [`Scheduler::start`] runs them, and [`SchedulerHandle::shutdown`] winds
//! everything down.

extern crate self as modhost_runtime;

mod config;
mod error;
mod execution;
mod method;
mod module;
mod registry;
mod schedule;
mod scheduler;

// Re-export public API
pub use crate::config::{
    config_source, load_config_file, load_descriptors, ConfigValue, FromConfigValue, ModuleConfig,
    ModuleDescriptor,
};
pub use error::{ConfigError, HostError};
pub use linkme;
pub use method::{CronMethod, IntoJobResult, JobResult, MethodId, Schedulables, TaskMethod};
pub use modhost_macro::schedulable;
pub use module::{Module, ModuleContext, Schedulable};
pub use registry::{Constructor, ModuleEntry, ModuleRegistry, MODULES};
pub use schedule::{CronZone, Schedule, ScheduleError};
pub use scheduler::{Scheduler, SchedulerBuilder, SchedulerHandle, ShutdownReport};
pub use tokio_util::sync::CancellationToken;
