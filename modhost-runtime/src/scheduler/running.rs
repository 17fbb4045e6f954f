use std::collections::BTreeMap;

use crate::execution::{ExecutionUnit, UnitKind};
use crate::method::MethodId;

/// Active execution units keyed by method identity.
#[derive(Debug, Default)]
pub(crate) struct RunningSet {
    units: BTreeMap<MethodId, ExecutionUnit>,
}

impl RunningSet {
    pub fn insert(&mut self, unit: ExecutionUnit) {
        self.units.insert(unit.id, unit);
    }

    pub fn contains(&self, id: MethodId) -> bool {
        self.units.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Drop cron units that have terminated. Task units stay until shutdown.
    pub fn reap_finished_crons(&mut self) -> usize {
        let before = self.units.len();
        self.units
            .retain(|_, unit| unit.kind != UnitKind::Cron || !unit.is_finished());
        before - self.units.len()
    }

    pub fn merge(&mut self, other: RunningSet) {
        self.units.extend(other.units);
    }

    /// Units in method registration order.
    pub fn into_units(self) -> impl Iterator<Item = ExecutionUnit> {
        self.units.into_values()
    }
}
