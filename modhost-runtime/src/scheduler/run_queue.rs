use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use tracing::error;

use crate::error::HostError;
use crate::method::Job;
use crate::schedule::Schedule;

struct Entry {
    due: DateTime<Utc>,
    job: Job,
    schedule: Schedule,
}

impl Entry {
    fn key(&self) -> (DateTime<Utc>, crate::method::MethodId) {
        (self.due, self.job.id)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap yields the earliest due time, ties by method id.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Cron jobs ordered by next due time.
#[derive(Default)]
pub(crate) struct RunQueue {
    heap: BinaryHeap<Entry>,
}

impl RunQueue {
    /// Compute every schedule's first due time. Fails on a schedule with no
    /// occurrence at all.
    pub fn build(crons: Vec<(Job, Schedule)>) -> Result<Self, HostError> {
        let mut heap = BinaryHeap::with_capacity(crons.len());
        for (job, mut schedule) in crons {
            let due = schedule.next_due().map_err(|source| HostError::InvalidSchedule {
                method: job.name.clone(),
                expression: schedule.expression().to_string(),
                source,
            })?;
            heap.push(Entry { due, job, schedule });
        }
        Ok(Self { heap })
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove the earliest entry and requeue it at its following due time.
    /// Returns the job with the due time that was popped.
    pub fn pop_earliest(&mut self) -> Option<(Job, DateTime<Utc>)> {
        let Entry { due, job, mut schedule } = self.heap.pop()?;
        match schedule.next_due() {
            Ok(next) => self.heap.push(Entry {
                due: next,
                job: job.clone(),
                schedule,
            }),
            Err(e) => error!(cron = %job.name, "dropping cron from the run queue: {e}"),
        }
        Some((job, due))
    }
}
