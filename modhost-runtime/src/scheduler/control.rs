use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::run_queue::RunQueue;
use super::running::RunningSet;
use crate::execution::spawn_cron_unit;

/// What to do with a popped cron firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Firing {
    Run,
    /// Due more than the staleness bound ago.
    Stale,
    /// The previous firing of the same method is still running.
    Overlapping,
}

pub(crate) fn judge(due: DateTime<Utc>, now: DateTime<Utc>, stale_after: Duration, running: bool) -> Firing {
    let late = (now - due).to_std().unwrap_or(Duration::ZERO);
    if late > stale_after {
        Firing::Stale
    } else if running {
        Firing::Overlapping
    } else {
        Firing::Run
    }
}

/// The single control task: sleeps until the earliest cron is due, then
/// starts it unless the firing is stale or overlapping.
pub(crate) struct ControlLoop {
    pub queue: RunQueue,
    pub running: RunningSet,
    pub cancel: CancellationToken,
    pub stale_after: Duration,
}

impl ControlLoop {
    /// Run until cancelled. Returns the units still referenced at exit.
    pub async fn run(mut self) -> RunningSet {
        info!(crons = self.queue.len(), units = self.running.len(), "scheduler loop started");

        while !self.cancel.is_cancelled() {
            let Some((job, due)) = self.queue.pop_earliest() else {
                debug!("no crons scheduled, waiting for shutdown");
                self.cancel.cancelled().await;
                break;
            };

            if let Ok(wait) = (due - Utc::now()).to_std() {
                if !wait.is_zero() {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }

            let reaped = self.running.reap_finished_crons();
            if reaped > 0 {
                debug!(reaped, "reaped finished cron units");
            }

            match judge(due, Utc::now(), self.stale_after, self.running.contains(job.id)) {
                Firing::Run => self.running.insert(spawn_cron_unit(job, due)),
                Firing::Stale => warn!(cron = %job.name, %due, "skipping expired cron firing"),
                Firing::Overlapping => {
                    info!(cron = %job.name, %due, "previous run still active, skipping firing")
                }
            }
        }

        info!("scheduler loop stopped");
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::method::testing::job;
    use crate::schedule::{CronZone, Schedule};

    const STALE: Duration = Duration::from_secs(60);

    #[test]
    fn test_judge() {
        let now = Utc::now();
        let secs = chrono::Duration::seconds;

        assert_eq!(judge(now, now, STALE, false), Firing::Run);
        assert_eq!(judge(now - secs(60), now, STALE, false), Firing::Run);
        assert_eq!(judge(now - secs(61), now, STALE, false), Firing::Stale);
        assert_eq!(judge(now + secs(5), now, STALE, false), Firing::Run);
        assert_eq!(judge(now, now, STALE, true), Firing::Overlapping);
        assert_eq!(judge(now - secs(120), now, STALE, true), Firing::Stale);
    }

    fn every_second(id: usize, name: &str, f: impl Fn() + Send + Sync + 'static) -> (crate::method::Job, Schedule) {
        (
            job(id, name, f),
            Schedule::parse("* * * * * *", CronZone::Utc, Utc::now()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_loop_fires_and_skips_overlaps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let queue = RunQueue::build(vec![every_second(0, "slow", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2500));
        })])
        .unwrap();

        let cancel = CancellationToken::new();
        let control = tokio::spawn(
            ControlLoop {
                queue,
                running: RunningSet::default(),
                cancel: cancel.clone(),
                stale_after: STALE,
            }
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(3300)).await;
        cancel.cancel();
        let running = control.await.unwrap();

        // About three firings were due; the ones during the 2.5s run were dropped.
        let fired = calls.load(Ordering::SeqCst);
        assert!((1..=2).contains(&fired), "fired {fired} times");
        assert!(running.len() <= 1);
    }

    #[tokio::test]
    async fn test_failing_cron_fires_on_every_due_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let queue = RunQueue::build(vec![(
            job(0, "broken", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("backend unavailable"))
            }),
            Schedule::parse("* * * * * *", CronZone::Utc, Utc::now()).unwrap(),
        )])
        .unwrap();

        let cancel = CancellationToken::new();
        let control = tokio::spawn(
            ControlLoop {
                queue,
                running: RunningSet::default(),
                cancel: cancel.clone(),
                stale_after: STALE,
            }
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(3200)).await;
        cancel.cancel();
        control.await.unwrap();

        // A failed firing neither stops the loop nor drops the next occurrence.
        let fired = calls.load(Ordering::SeqCst);
        assert!(fired >= 2, "fired {fired} times");
    }

    #[tokio::test]
    async fn test_loop_skips_stale_backlog() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let ten_minutes_ago = Utc::now() - chrono::Duration::minutes(10);
        let queue = RunQueue::build(vec![(
            job(0, "minutely", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Schedule::parse("* * * * *", CronZone::Utc, ten_minutes_ago).unwrap(),
        )])
        .unwrap();

        let cancel = CancellationToken::new();
        let control = tokio::spawn(
            ControlLoop {
                queue,
                running: RunningSet::default(),
                cancel: cancel.clone(),
                stale_after: STALE,
            }
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        control.await.unwrap();

        // Older occurrences are stale and skipped; only the current minute runs,
        // plus the next one if a minute boundary passed during the test.
        let fired = calls.load(Ordering::SeqCst);
        assert!((1..=2).contains(&fired), "fired {fired} times");
    }

    #[tokio::test]
    async fn test_loop_without_crons_waits_for_cancel() {
        let cancel = CancellationToken::new();
        let control = tokio::spawn(
            ControlLoop {
                queue: RunQueue::default(),
                running: RunningSet::default(),
                cancel: cancel.clone(),
                stale_after: STALE,
            }
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!control.is_finished());
        cancel.cancel();
        let running = tokio::time::timeout(Duration::from_secs(1), control)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(running.len(), 0);
    }
}
