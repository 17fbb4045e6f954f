use std::fmt;

use chrono::{DateTime, Local, Utc};
use croner::errors::CronError;
use croner::Cron;
use serde::Deserialize;
use thiserror::Error;

/// Errors produced while parsing or evaluating a cron expression.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("expected 5 or 6 fields but found {0}")]
    FieldCount(usize),

    #[error(transparent)]
    Parse(#[from] CronError),

    #[error("no occurrence after {after}: {source}")]
    Exhausted {
        after: DateTime<Utc>,
        #[source]
        source: CronError,
    },
}

/// Time zone in which cron fields are interpreted.
///
/// `Utc` never repeats or skips a wall-clock hour. `Local` follows the host's
/// clock, so an hour repeated when daylight saving ends fires only once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CronZone {
    Local,
    #[default]
    Utc,
}

/// Iterator over the due times of one cron expression.
///
/// Each call to [`Schedule::next_due`] yields a time strictly after the
/// previously yielded one (or the start time on the first call).
pub struct Schedule {
    expression: String,
    cron: Cron,
    zone: CronZone,
    cursor: DateTime<Utc>,
}

impl Schedule {
    /// Parse `expression`. Five fields are standard cron; a sixth trailing field
    /// is a seconds field, e.g. `* * * * * */10` for every ten seconds.
    pub fn parse(expression: &str, zone: CronZone, start: DateTime<Utc>) -> Result<Self, ScheduleError> {
        let pattern = seconds_first(expression)?;
        let cron = Cron::new(&pattern).with_seconds_optional().parse()?;
        Ok(Self {
            expression: expression.to_string(),
            cron,
            zone,
            cursor: start,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Advance to the next due time.
    pub fn next_due(&mut self) -> Result<DateTime<Utc>, ScheduleError> {
        let after = self.cursor;
        let exhausted = |source| ScheduleError::Exhausted { after, source };
        let next = match self.zone {
            CronZone::Utc => self
                .cron
                .find_next_occurrence(&after, false)
                .map_err(exhausted)?,
            CronZone::Local => self
                .cron
                .find_next_occurrence(&after.with_timezone(&Local), false)
                .map_err(exhausted)?
                .with_timezone(&Utc),
        };
        self.cursor = next;
        Ok(next)
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("expression", &self.expression)
            .field("zone", &self.zone)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// croner expects seconds in the leading position.
fn seconds_first(expression: &str) -> Result<String, ScheduleError> {
    let mut fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(fields.join(" ")),
        6 => {
            fields.rotate_right(1);
            Ok(fields.join(" "))
        }
        n => Err(ScheduleError::FieldCount(n)),
    }
}
