// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-process recurring timers.
//!
//! Each timed process gets one tokio task that sleeps until the schedule's next
//! fire time and then calls the fire callback. The callback is expected to hand
//! the trigger off (the engine spawns an `enqueue` task), so aborting a timer
//! never interrupts an admission that is already under way.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::schedule::{Schedule, ScheduleError, delay_until};
use crate::types::ProcessId;

/// Called on every firing with the process id.
pub type FireFn = Arc<dyn Fn(ProcessId) + Send + Sync>;

struct Timer {
    schedule: Schedule,
    handle: JoinHandle<()>,
}

/// One recurring timer per process.
#[derive(Default)]
pub struct TimerSet {
    timers: HashMap<ProcessId, Timer>,
}

impl TimerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the timer for `id` follow `schedule`.
    ///
    /// A live timer with an equal schedule is kept as is. Any other timer is
    /// replaced. Manual schedules leave the process without a timer.
    /// Returns whether a new timer task was spawned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn ensure(
        &mut self,
        id: ProcessId,
        schedule: &Schedule,
        fire: FireFn,
    ) -> Result<bool, ScheduleError> {
        if !schedule.is_timed() {
            self.cancel(id);
            return Ok(false);
        }

        if let Some(timer) = self.timers.get(&id)
            && timer.schedule == *schedule
            && !timer.handle.is_finished()
        {
            return Ok(false);
        }

        schedule.validate()?;
        self.cancel(id);

        let handle = tokio::spawn(run_timer(id, schedule.clone(), fire));
        self.timers.insert(
            id,
            Timer {
                schedule: schedule.clone(),
                handle,
            },
        );
        debug!(process_id = %id, schedule = ?schedule, "Timer scheduled");
        Ok(true)
    }

    /// Stop the timer for `id`. Returns whether one existed.
    pub fn cancel(&mut self, id: ProcessId) -> bool {
        match self.timers.remove(&id) {
            Some(timer) => {
                timer.handle.abort();
                debug!(process_id = %id, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Stop every timer.
    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    /// Whether `id` has a timer.
    pub fn contains(&self, id: ProcessId) -> bool {
        self.timers.contains_key(&id)
    }

    /// Schedule of the timer for `id`, if any.
    pub fn schedule(&self, id: ProcessId) -> Option<&Schedule> {
        self.timers.get(&id).map(|t| &t.schedule)
    }

    /// Number of timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether there are no timers.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn run_timer(id: ProcessId, schedule: Schedule, fire: FireFn) {
    // Previous fire time and the monotonic deadline it was slept to
    let mut last: Option<(DateTime<Utc>, Instant)> = None;

    loop {
        let now = Utc::now();
        // Never before the previous occurrence, even if the wall clock lags behind it
        let base = last.map_or(now, |(prev, _)| now.max(prev));
        let next = match schedule.next_after(base) {
            Ok(Some(next)) => next,
            Ok(None) => return,
            Err(e) => {
                warn!(process_id = %id, error = %e, "Timer stopped, no next fire time");
                return;
            }
        };
        let deadline = match last {
            Some((prev, prev_deadline)) => prev_deadline + delay_until(next, prev),
            None => Instant::now() + delay_until(next, now),
        };

        tokio::time::sleep_until(deadline).await;
        fire(id);
        last = Some((next, deadline));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, FireFn) {
        let count = Arc::new(AtomicUsize::new(0));
        let fire: FireFn = {
            let count = count.clone();
            Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, fire)
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_timer_fires_repeatedly() {
        let mut timers = TimerSet::new();
        let (count, fire) = counter();
        assert!(
            timers
                .ensure(ProcessId(1), &Schedule::every(Duration::from_secs(10)), fire)
                .unwrap()
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchored_interval_fires_once_per_occurrence() {
        let mut timers = TimerSet::new();
        let (count, fire) = counter();
        let schedule = Schedule::Interval {
            every_secs: 10,
            start_at: Some(Utc::now() + chrono::TimeDelta::seconds(5)),
        };
        timers.ensure(ProcessId(1), &schedule, fire).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Wall clock stands still under paused time; the anchor must not fire again
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_schedule_keeps_timer() {
        let mut timers = TimerSet::new();
        let (count, fire) = counter();
        let schedule = Schedule::every(Duration::from_secs(10));
        timers.ensure(ProcessId(1), &schedule, fire.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!timers.ensure(ProcessId(1), &schedule, fire).unwrap());

        // Not restarted, so the first firing still happens at t=10
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(timers.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_schedule_replaces_timer() {
        let mut timers = TimerSet::new();
        let (count, fire) = counter();
        timers
            .ensure(ProcessId(1), &Schedule::every(Duration::from_secs(10)), fire.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let slower = Schedule::every(Duration::from_secs(60));
        assert!(timers.ensure(ProcessId(1), &slower, fire).unwrap());
        assert_eq!(timers.schedule(ProcessId(1)), Some(&slower));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_firing() {
        let mut timers = TimerSet::new();
        let (count, fire) = counter();
        timers
            .ensure(ProcessId(2), &Schedule::every(Duration::from_secs(5)), fire)
            .unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(timers.cancel(ProcessId(2)));
        assert!(!timers.cancel(ProcessId(2)));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
    }

    #[tokio::test]
    async fn test_manual_schedule_gets_no_timer() {
        let mut timers = TimerSet::new();
        let (_, fire) = counter();
        timers
            .ensure(ProcessId(3), &Schedule::every(Duration::from_secs(5)), fire.clone())
            .unwrap();
        assert!(!timers.ensure(ProcessId(3), &Schedule::Manual, fire).unwrap());
        assert!(!timers.contains(ProcessId(3)));
    }

    #[tokio::test]
    async fn test_invalid_schedule_rejected() {
        let mut timers = TimerSet::new();
        let (_, fire) = counter();
        let err = timers
            .ensure(ProcessId(4), &Schedule::cron("not a cron"), fire)
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCron { .. }));
        assert!(!timers.contains(ProcessId(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let mut timers = TimerSet::new();
        let (count, fire) = counter();
        for id in 1..=3 {
            timers
                .ensure(ProcessId(id), &Schedule::every(Duration::from_secs(5)), fire.clone())
                .unwrap();
        }
        assert_eq!(timers.len(), 3);
        timers.cancel_all();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
