// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock payload for testing.
//!
//! Records every execution, tracks how many executions of each process overlap,
//! and can be told to sleep, fail, panic, or block until released.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{ExecutionContext, Payload, PayloadError, Result};
use crate::types::{ExecutionRequest, ProcessId, RegistrationId};

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<ExecutionRequest>,
    finished: Vec<ExecutionRequest>,
    running: HashMap<ProcessId, usize>,
    max_running: HashMap<ProcessId, usize>,
    total_running: usize,
    max_total_running: usize,
}

/// Mock payload for testing.
pub struct MockPayload {
    state: Arc<Mutex<MockState>>,
    /// Simulated execution time.
    pub execution_delay: Duration,
    /// If true, every execution fails.
    pub fail_by_default: bool,
    failing: Mutex<HashSet<ProcessId>>,
    panicking: Mutex<HashSet<ProcessId>>,
    gate: Option<Arc<Semaphore>>,
}

impl Default for MockPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPayload {
    /// Mock that succeeds after a short delay.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            execution_delay: Duration::from_millis(10),
            fail_by_default: false,
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            gate: None,
        }
    }

    /// Mock that fails every execution.
    pub fn failing() -> Self {
        Self {
            fail_by_default: true,
            ..Self::new()
        }
    }

    /// Mock whose executions block until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self {
            execution_delay: Duration::ZERO,
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    /// Set the simulated execution time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.execution_delay = delay;
        self
    }

    /// Let `count` blocked executions of a gated mock finish.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Make executions of one process fail.
    pub fn fail_process(&self, id: ProcessId) {
        lock(&self.failing).insert(id);
    }

    /// Make executions of one process succeed again.
    pub fn recover_process(&self, id: ProcessId) {
        lock(&self.failing).remove(&id);
    }

    /// Make executions of one process panic.
    pub fn panic_process(&self, id: ProcessId) {
        lock(&self.panicking).insert(id);
    }

    /// Every execution started, in start order.
    pub fn calls(&self) -> Vec<ExecutionRequest> {
        lock(&self.state).calls.clone()
    }

    /// Registration ids executed for one process, in start order.
    pub fn calls_for(&self, id: ProcessId) -> Vec<RegistrationId> {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.process_id == id)
            .map(|c| c.registration_id)
            .collect()
    }

    /// Number of executions started.
    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }

    /// Number of executions that returned (successfully or not).
    pub fn finished_count(&self) -> usize {
        lock(&self.state).finished.len()
    }

    /// Executions currently inside the payload.
    pub fn running(&self) -> usize {
        lock(&self.state).total_running
    }

    /// Highest number of overlapping executions seen for one process.
    pub fn max_concurrency(&self, id: ProcessId) -> usize {
        lock(&self.state).max_running.get(&id).copied().unwrap_or(0)
    }

    /// Highest number of overlapping executions seen overall.
    pub fn max_total_concurrency(&self) -> usize {
        lock(&self.state).max_total_running
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decrements the running counters even if the execution panics.
struct RunningGuard {
    state: Arc<Mutex<MockState>>,
    request: ExecutionRequest,
}

impl RunningGuard {
    fn enter(state: Arc<Mutex<MockState>>, request: ExecutionRequest) -> Self {
        {
            let mut s = lock(&state);
            s.calls.push(request.clone());
            let running = s.running.entry(request.process_id).or_default();
            *running += 1;
            let current = *running;
            let max = s.max_running.entry(request.process_id).or_default();
            *max = (*max).max(current);
            s.total_running += 1;
            s.max_total_running = s.max_total_running.max(s.total_running);
        }
        Self { state, request }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut s = lock(&self.state);
        if let Some(running) = s.running.get_mut(&self.request.process_id) {
            *running = running.saturating_sub(1);
        }
        s.total_running = s.total_running.saturating_sub(1);
        s.finished.push(self.request.clone());
    }
}

#[async_trait]
impl Payload for MockPayload {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<()> {
        let id = ctx.process_id();
        let _guard = RunningGuard::enter(self.state.clone(), ctx.request.clone());

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| PayloadError::Failed("gate closed".to_string()))?;
            permit.forget();
        }

        if !self.execution_delay.is_zero() {
            tokio::time::sleep(self.execution_delay).await;
        }

        if lock(&self.panicking).contains(&id) {
            panic!("mock payload panic for process {}", id);
        }

        if self.fail_by_default || lock(&self.failing).contains(&id) {
            return Err(PayloadError::Failed(format!(
                "mock failure for process {}",
                id
            )));
        }

        Ok(())
    }
}
