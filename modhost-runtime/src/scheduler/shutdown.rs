use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::running::RunningSet;
use super::LoadedModule;

/// What happened to each unit and module during shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Units that exited within the join bound, as `instance::method`.
    pub joined: Vec<String>,
    /// Units still running after the join bound.
    pub abandoned: Vec<String>,
    /// Module instances whose `close` returned successfully.
    pub closed: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty()
    }
}

/// Join every unit with a per-unit bound, then close the modules none of whose
/// units were abandoned, in load order. Modules in `tainted` are never closed.
pub(crate) async fn run_sequencer(
    running: RunningSet,
    modules: &[LoadedModule],
    mut tainted: BTreeSet<usize>,
    join_timeout: Duration,
) -> ShutdownReport {
    let mut report = ShutdownReport::default();

    for mut unit in running.into_units() {
        if !unit.is_finished() {
            info!(unit = %unit.name, "waiting for unit to exit");
        }
        match tokio::time::timeout(join_timeout, &mut unit.handle).await {
            Ok(Ok(())) => report.joined.push(unit.name),
            Ok(Err(e)) => {
                error!(unit = %unit.name, "unit terminated abnormally: {e}");
                report.joined.push(unit.name);
            }
            Err(_) => {
                warn!(unit = %unit.name, "unit did not exit within {join_timeout:?}, abandoning it");
                tainted.insert(unit.module);
                report.abandoned.push(unit.name);
            }
        }
    }

    for (index, loaded) in modules.iter().enumerate() {
        if tainted.contains(&index) {
            warn!(instance = %loaded.instance, "skipping cleanup, module still has running units");
            continue;
        }
        let module = Arc::clone(&loaded.module);
        let span = loaded.span.clone();
        let close = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            debug!("closing module");
            module.close()
        });
        match tokio::time::timeout(join_timeout, close).await {
            Ok(Ok(Ok(()))) => report.closed.push(loaded.instance.clone()),
            Ok(Ok(Err(e))) => error!(instance = %loaded.instance, "cleanup failed: {e:#}"),
            Ok(Err(e)) => error!(instance = %loaded.instance, "cleanup panicked: {e}"),
            Err(_) => warn!(instance = %loaded.instance, "cleanup did not finish within {join_timeout:?}"),
        }
    }

    report
}
