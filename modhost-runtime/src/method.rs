use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::Span;

/// Outcome of one invocation of a task or cron method.
pub type JobResult = anyhow::Result<()>;

pub(crate) type Callable = Arc<dyn Fn() -> JobResult + Send + Sync>;

/// Return types accepted from task and cron methods.
pub trait IntoJobResult {
    fn into_job_result(self) -> JobResult;
}

impl IntoJobResult for () {
    fn into_job_result(self) -> JobResult {
        Ok(())
    }
}

impl<E> IntoJobResult for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_job_result(self) -> JobResult {
        self.map_err(Into::into)
    }
}

fn callable<F, R>(f: F) -> Callable
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoJobResult,
{
    Arc::new(move || f().into_job_result())
}

/// A long-lived method started once at startup and retried until it succeeds.
#[derive(Clone)]
pub struct TaskMethod {
    name: String,
    call: Callable,
}

impl TaskMethod {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for TaskMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMethod").field("name", &self.name).finish()
    }
}

/// A method fired at the due times of a cron expression.
#[derive(Clone)]
pub struct CronMethod {
    name: String,
    expression: String,
    call: Callable,
}

impl CronMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl fmt::Debug for CronMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronMethod")
            .field("name", &self.name)
            .field("expression", &self.expression)
            .finish()
    }
}

/// Explicit registration list of a module instance's tasks and crons.
///
/// Usually generated by `#[schedulable]`, but can be assembled by hand:
///
/// ```ignore
/// Schedulables::new()
///     .task("listen", move || this.listen())
///     .cron("report", "*/5 * * * *", move || other.report())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Schedulables {
    tasks: Vec<TaskMethod>,
    crons: Vec<CronMethod>,
}

impl Schedulables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task<F, R>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoJobResult,
    {
        self.tasks.push(TaskMethod {
            name: name.into(),
            call: callable(f),
        });
        self
    }

    pub fn cron<F, R>(mut self, name: impl Into<String>, expression: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoJobResult,
    {
        self.crons.push(CronMethod {
            name: name.into(),
            expression: expression.into(),
            call: callable(f),
        });
        self
    }

    pub fn tasks(&self) -> &[TaskMethod] {
        &self.tasks
    }

    pub fn crons(&self) -> &[CronMethod] {
        &self.crons
    }

    pub(crate) fn into_parts(self) -> (Vec<TaskMethod>, Vec<CronMethod>) {
        (self.tasks, self.crons)
    }
}

/// Stable identity of a registered method, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId(pub(crate) usize);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A task or cron method bound to its owning module instance.
#[derive(Clone)]
pub(crate) struct Job {
    pub id: MethodId,
    pub module: usize,
    pub name: String,
    pub span: Span,
    call: Callable,
}

impl Job {
    pub fn from_task(id: MethodId, module: usize, instance: &str, span: &Span, task: TaskMethod) -> Self {
        Self::bind(id, module, instance, span, task.name, task.call)
    }

    pub fn from_cron(id: MethodId, module: usize, instance: &str, span: &Span, cron: CronMethod) -> Self {
        Self::bind(id, module, instance, span, cron.name, cron.call)
    }

    fn bind(id: MethodId, module: usize, instance: &str, span: &Span, method: String, call: Callable) -> Self {
        Self {
            id,
            module,
            name: format!("{instance}::{method}"),
            span: span.clone(),
            call,
        }
    }

    /// Invoke the method once. A panic inside the method is reported as an error.
    pub fn invoke(&self) -> JobResult {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.call)())) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("module", &self.module)
            .field("name", &self.name)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
