// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory execution log.
//!
//! Keeps the full history in process memory. Used when no database is
//! configured and as the inspection point in tests; it can also be told to
//! fail so log-store outages can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ExecutionLogger, LogError, Result};
use crate::types::{
    ExecutionMessage, ExecutionRecord, ExecutionState, MessageLevel, ProcessId, RegistrationId,
};

#[derive(Debug, Clone)]
struct Execution {
    process_id: ProcessId,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct LogState {
    executions: HashMap<RegistrationId, Execution>,
    records: Vec<ExecutionRecord>,
    messages: Vec<ExecutionMessage>,
}

/// Execution log kept in memory.
#[derive(Debug)]
pub struct InMemoryExecutionLogger {
    next_id: AtomicI64,
    state: Mutex<LogState>,
    unavailable: AtomicBool,
    failing_starts: AtomicUsize,
}

impl Default for InMemoryExecutionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExecutionLogger {
    /// Create an empty log. Registration ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            state: Mutex::new(LogState::default()),
            unavailable: AtomicBool::new(false),
            failing_starts: AtomicUsize::new(0),
        }
    }

    /// Make the next `start` call fail as if the store were unreachable.
    pub fn fail_next_start(&self) {
        self.failing_starts.fetch_add(1, Ordering::SeqCst);
    }

    /// Make every call fail (or succeed again) as if the store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every state row, in append order.
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.lock().records.clone()
    }

    /// States recorded for one execution, in append order.
    pub fn states(&self, registration_id: RegistrationId) -> Vec<ExecutionState> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.registration_id == registration_id)
            .map(|r| r.state)
            .collect()
    }

    /// Last state recorded for one execution.
    pub fn final_state(&self, registration_id: RegistrationId) -> Option<ExecutionState> {
        self.states(registration_id).last().copied()
    }

    /// State rows for every execution of a process, in append order.
    pub fn history(&self, process_id: ProcessId) -> Vec<ExecutionRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.process_id == process_id)
            .cloned()
            .collect()
    }

    /// Registration ids minted for a process, in minting order.
    pub fn registrations(&self, process_id: ProcessId) -> Vec<RegistrationId> {
        let mut ids: Vec<_> = self
            .lock()
            .executions
            .iter()
            .filter(|(_, e)| e.process_id == process_id)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Diagnostic messages attached to one execution.
    pub fn messages(&self, registration_id: RegistrationId) -> Vec<ExecutionMessage> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.registration_id == registration_id)
            .cloned()
            .collect()
    }

    /// Recorded processing start and end time of one execution.
    pub fn times(
        &self,
        registration_id: RegistrationId,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        self.lock()
            .executions
            .get(&registration_id)
            .map_or((None, None), |e| (e.start_time, e.end_time))
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LogError::Unavailable("in-memory log disabled".to_string()));
        }
        Ok(())
    }

    fn update_execution(
        &self,
        registration_id: RegistrationId,
        apply: impl FnOnce(&mut Execution),
    ) -> Result<()> {
        self.check_available()?;
        let mut state = self.lock();
        let execution = state
            .executions
            .get_mut(&registration_id)
            .ok_or(LogError::UnknownRegistration(registration_id))?;
        apply(execution);
        Ok(())
    }
}

#[async_trait]
impl ExecutionLogger for InMemoryExecutionLogger {
    async fn start(&self, process_id: ProcessId) -> Result<RegistrationId> {
        self.check_available()?;
        let fail = self
            .failing_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(LogError::Unavailable("injected start failure".to_string()));
        }

        let registration_id = RegistrationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().executions.insert(
            registration_id,
            Execution {
                process_id,
                start_time: None,
                end_time: None,
            },
        );
        Ok(registration_id)
    }

    async fn set_start_time(
        &self,
        registration_id: RegistrationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.update_execution(registration_id, |e| e.start_time = Some(timestamp))
    }

    async fn set_end_time(
        &self,
        registration_id: RegistrationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.update_execution(registration_id, |e| e.end_time = Some(timestamp))
    }

    async fn result(
        &self,
        state: ExecutionState,
        timestamp: DateTime<Utc>,
        registration_id: RegistrationId,
    ) -> Result<()> {
        self.check_available()?;
        let mut log = self.lock();
        let process_id = log
            .executions
            .get(&registration_id)
            .map(|e| e.process_id)
            .ok_or(LogError::UnknownRegistration(registration_id))?;
        log.records.push(ExecutionRecord {
            registration_id,
            process_id,
            state,
            timestamp,
        });
        Ok(())
    }

    async fn add_message(
        &self,
        registration_id: RegistrationId,
        level: MessageLevel,
        text: &str,
    ) -> Result<()> {
        self.check_available()?;
        let mut log = self.lock();
        if !log.executions.contains_key(&registration_id) {
            return Err(LogError::UnknownRegistration(registration_id));
        }
        log.messages.push(ExecutionMessage {
            registration_id,
            level,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn last_process_timestamp(
        &self,
        process_id: ProcessId,
    ) -> Result<Option<DateTime<Utc>>> {
        self.check_available()?;
        let log = self.lock();
        let last = log
            .records
            .iter()
            .filter(|r| r.process_id == process_id && r.state == ExecutionState::Done)
            .filter_map(|r| log.executions.get(&r.registration_id)?.end_time)
            .max();
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn test_registration_ids_are_unique() {
        let logger = InMemoryExecutionLogger::new();
        let a = logger.start(ProcessId(1)).await.unwrap();
        let b = logger.start(ProcessId(1)).await.unwrap();
        let c = logger.start(ProcessId(2)).await.unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(logger.registrations(ProcessId(1)), vec![a, b]);
    }

    #[tokio::test]
    async fn test_states_append_in_order() {
        let logger = InMemoryExecutionLogger::new();
        let id = logger.start(ProcessId(1)).await.unwrap();
        let now = Utc::now();
        for state in [
            ExecutionState::Queued,
            ExecutionState::Running,
            ExecutionState::Done,
        ] {
            logger.result(state, now, id).await.unwrap();
        }
        assert_eq!(
            logger.states(id),
            vec![
                ExecutionState::Queued,
                ExecutionState::Running,
                ExecutionState::Done
            ]
        );
        assert_eq!(logger.final_state(id), Some(ExecutionState::Done));
        assert_eq!(logger.history(ProcessId(1)).len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_registration_rejected() {
        let logger = InMemoryExecutionLogger::new();
        let err = logger
            .result(ExecutionState::Done, Utc::now(), RegistrationId(99))
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::UnknownRegistration(RegistrationId(99))));
    }

    #[tokio::test]
    async fn test_fail_next_start_fails_once() {
        let logger = InMemoryExecutionLogger::new();
        logger.fail_next_start();
        assert!(logger.start(ProcessId(1)).await.is_err());
        assert!(logger.start(ProcessId(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let logger = InMemoryExecutionLogger::new();
        logger.set_unavailable(true);
        assert!(matches!(
            logger.start(ProcessId(1)).await,
            Err(LogError::Unavailable(_))
        ));
        logger.set_unavailable(false);
        assert!(logger.start(ProcessId(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_times_and_messages() {
        let logger = InMemoryExecutionLogger::new();
        let id = logger.start(ProcessId(4)).await.unwrap();
        let begin = Utc::now();
        let end = begin + TimeDelta::seconds(3);
        logger.set_start_time(id, begin).await.unwrap();
        logger.set_end_time(id, end).await.unwrap();
        logger
            .add_message(id, MessageLevel::Error, "station offline")
            .await
            .unwrap();

        assert_eq!(logger.times(id), (Some(begin), Some(end)));
        let messages = logger.messages(id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "station offline");
        assert_eq!(messages[0].level, MessageLevel::Error);
    }

    #[tokio::test]
    async fn test_last_process_timestamp_only_counts_done() {
        let logger = InMemoryExecutionLogger::new();
        let base = Utc::now();

        let ok = logger.start(ProcessId(5)).await.unwrap();
        logger.set_end_time(ok, base).await.unwrap();
        logger.result(ExecutionState::Done, base, ok).await.unwrap();

        let failed = logger.start(ProcessId(5)).await.unwrap();
        let later = base + TimeDelta::minutes(5);
        logger.set_end_time(failed, later).await.unwrap();
        logger
            .result(ExecutionState::Error, later, failed)
            .await
            .unwrap();

        assert_eq!(
            logger.last_process_timestamp(ProcessId(5)).await.unwrap(),
            Some(base)
        );
        assert_eq!(
            logger.last_process_timestamp(ProcessId(6)).await.unwrap(),
            None
        );
    }
}
