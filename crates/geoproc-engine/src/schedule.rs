// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process schedules and next-fire computation.
//!
//! A process is triggered either on a fixed interval (optionally aligned to an
//! anchor time), on a cron expression evaluated in UTC, or only manually.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use croner::Cron;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from schedule validation and evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ScheduleError {
    /// Interval schedules need a non-zero period.
    #[error("Interval must be greater than zero")]
    ZeroInterval,

    /// Interval does not fit in the supported time range.
    #[error("Interval of {0} seconds is out of range")]
    IntervalOutOfRange(u64),

    /// Cron expression could not be parsed.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        /// The offending expression.
        expression: String,
        /// Parser message.
        reason: String,
    },

    /// No future occurrence could be computed.
    #[error("No next occurrence: {0}")]
    NoNextOccurrence(String),
}

/// When a process is triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire every `every_secs` seconds.
    Interval {
        /// Period in seconds.
        every_secs: u64,
        /// Optional anchor; fires align to `start_at + k * every`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_at: Option<DateTime<Utc>>,
    },
    /// Fire on a 5- or 6-field cron expression (UTC).
    Cron {
        /// The cron expression.
        expression: String,
    },
    /// Never fire on its own; runs only when triggered explicitly.
    Manual,
}

impl Schedule {
    /// Interval schedule without an anchor.
    pub fn every(period: Duration) -> Self {
        Self::Interval {
            every_secs: period.as_secs(),
            start_at: None,
        }
    }

    /// Cron schedule.
    pub fn cron(expression: impl Into<String>) -> Self {
        Self::Cron {
            expression: expression.into(),
        }
    }

    /// Whether this schedule needs a timer.
    pub fn is_timed(&self) -> bool {
        !matches!(self, Self::Manual)
    }

    /// Check the schedule can be evaluated.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self {
            Self::Interval { every_secs, .. } => interval_delta(*every_secs).map(|_| ()),
            Self::Cron { expression } => parse_cron(expression).map(|_| ()),
            Self::Manual => Ok(()),
        }
    }

    /// Next fire time strictly after `now`, or `None` for manual schedules.
    pub fn next_after(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        match self {
            Self::Interval {
                every_secs,
                start_at,
            } => {
                let every = interval_delta(*every_secs)?;
                let next = match start_at {
                    Some(anchor) if now < *anchor => Some(*anchor),
                    Some(anchor) => {
                        let elapsed = (now - *anchor).num_seconds().max(0) as u64;
                        let periods = elapsed / every_secs + 1;
                        periods
                            .checked_mul(*every_secs)
                            .and_then(|secs| i64::try_from(secs).ok())
                            .and_then(TimeDelta::try_seconds)
                            .and_then(|offset| anchor.checked_add_signed(offset))
                    }
                    None => now.checked_add_signed(every),
                };
                next.map(Some)
                    .ok_or(ScheduleError::IntervalOutOfRange(*every_secs))
            }
            Self::Cron { expression } => {
                let cron = parse_cron(expression)?;
                cron.find_next_occurrence(&now, false)
                    .map(Some)
                    .map_err(|e| ScheduleError::NoNextOccurrence(e.to_string()))
            }
            Self::Manual => Ok(None),
        }
    }
}

/// Time to wait from `now` until `next`, zero if `next` already passed.
pub fn delay_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

fn interval_delta(every_secs: u64) -> Result<TimeDelta, ScheduleError> {
    if every_secs == 0 {
        return Err(ScheduleError::ZeroInterval);
    }
    i64::try_from(every_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or(ScheduleError::IntervalOutOfRange(every_secs))
}

fn parse_cron(expression: &str) -> Result<Cron, ScheduleError> {
    Cron::new(expression)
        .with_seconds_optional()
        .parse()
        .map_err(|e| ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}
