// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Admission queue.
//!
//! Enforces at-most-one concurrent execution per process id:
//!
//! ```text
//! IDLE ──admit──► READY ──pop_ready──► RUNNING ──release──► IDLE
//!                   │                     │
//!                   └── admit (same id) ──┴──► appended to WaitQueue[id]
//!
//! RUNNING ──release, WaitQueue[id] non-empty──► READY (oldest waiter, front of queue)
//! ```
//!
//! The structure is synchronous and performs no I/O; the engine guards it with
//! a single mutex and never holds that mutex across an await point.
//!
//! Invariants:
//! - an id is active iff it has a request in the ReadyQueue or a running execution;
//! - WaitQueue entries exist only for active ids;
//! - an id appears at most once across the ReadyQueue and the running set.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::types::{ExecutionRequest, ProcessId};

/// Where an admitted request was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Appended to the ReadyQueue; the process was idle.
    Ready,
    /// Appended to the process's WaitQueue; the process was already active.
    Deferred,
}

/// Outcome of releasing a completed execution.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Release {
    /// Waiting request moved to the front of the ReadyQueue.
    pub promoted: Option<ExecutionRequest>,
    /// Waiting requests dropped because draining was not allowed.
    pub cancelled: Vec<ExecutionRequest>,
}

/// Point-in-time copy of the queue contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// ReadyQueue in dispatch order.
    pub ready: Vec<ExecutionRequest>,
    /// WaitQueue contents per process, oldest first.
    pub waiting: BTreeMap<ProcessId, Vec<ExecutionRequest>>,
    /// Active process ids, sorted.
    pub active: Vec<ProcessId>,
    /// Ids with an execution handed to a worker, sorted.
    pub running: Vec<ProcessId>,
}

impl QueueSnapshot {
    /// Total number of waiting requests.
    pub fn waiting_len(&self) -> usize {
        self.waiting.values().map(Vec::len).sum()
    }

    /// Whether nothing is queued, waiting, or running.
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.waiting.is_empty() && self.active.is_empty()
    }
}

/// Ready queue, per-id wait queues, and the active set.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    ready: VecDeque<ExecutionRequest>,
    waiting: HashMap<ProcessId, VecDeque<ExecutionRequest>>,
    active: HashSet<ProcessId>,
    running: HashSet<ProcessId>,
}

impl AdmissionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a request, deferring it if its process is already active.
    pub fn admit(&mut self, request: ExecutionRequest) -> Placement {
        if self.active.insert(request.process_id) {
            self.ready.push_back(request);
            Placement::Ready
        } else {
            self.waiting
                .entry(request.process_id)
                .or_default()
                .push_back(request);
            Placement::Deferred
        }
    }

    /// Pop the head of the ReadyQueue and mark its process running.
    ///
    /// The process stays active until [`release`](Self::release).
    pub fn pop_ready(&mut self) -> Option<ExecutionRequest> {
        let request = self.ready.pop_front()?;
        let newly_running = self.running.insert(request.process_id);
        debug_assert!(newly_running, "process dispatched twice concurrently");
        Some(request)
    }

    /// Release a process after its execution completed.
    ///
    /// With `keep_draining`, the oldest waiting request (if any) is promoted to
    /// the front of the ReadyQueue and the process stays active. Without it, the
    /// process becomes idle and its waiting requests are handed back as cancelled.
    pub fn release(&mut self, id: ProcessId, keep_draining: bool) -> Release {
        self.running.remove(&id);

        if keep_draining {
            if let Some(waiters) = self.waiting.get_mut(&id)
                && let Some(next) = waiters.pop_front()
            {
                if waiters.is_empty() {
                    self.waiting.remove(&id);
                }
                self.ready.push_front(next.clone());
                return Release {
                    promoted: Some(next),
                    cancelled: Vec::new(),
                };
            }
            self.waiting.remove(&id);
            self.active.remove(&id);
            return Release::default();
        }

        let cancelled = self
            .waiting
            .remove(&id)
            .map(Vec::from)
            .unwrap_or_default();
        self.active.remove(&id);
        Release {
            promoted: None,
            cancelled,
        }
    }

    /// Drop every queued and waiting request for a process, oldest first.
    ///
    /// A running execution is left alone: its id stays active until the
    /// completion releases it, so a re-admitted trigger still waits for it.
    pub fn purge(&mut self, id: ProcessId) -> Vec<ExecutionRequest> {
        let mut dropped = Vec::new();
        self.ready.retain(|request| {
            if request.process_id == id {
                dropped.push(request.clone());
                false
            } else {
                true
            }
        });
        if let Some(waiters) = self.waiting.remove(&id) {
            dropped.extend(waiters);
        }
        if !self.running.contains(&id) {
            self.active.remove(&id);
        }
        dropped
    }

    /// Drop everything not yet running (shutdown).
    ///
    /// Returns ReadyQueue entries in dispatch order followed by waiting
    /// entries grouped by process id.
    pub fn drain_all(&mut self) -> Vec<ExecutionRequest> {
        let mut dropped: Vec<_> = self.ready.drain(..).collect();
        let mut waiting: Vec<_> = self.waiting.drain().collect();
        waiting.sort_by_key(|(id, _)| *id);
        for (_, waiters) in waiting {
            dropped.extend(waiters);
        }
        let running = &self.running;
        self.active.retain(|id| running.contains(id));
        dropped
    }

    /// Whether the process has a queued or running execution.
    pub fn is_active(&self, id: ProcessId) -> bool {
        self.active.contains(&id)
    }

    /// Whether the process has an execution handed to a worker.
    pub fn is_running(&self, id: ProcessId) -> bool {
        self.running.contains(&id)
    }

    /// Number of requests awaiting a worker.
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Number of deferred requests for a process.
    pub fn waiting_len(&self, id: ProcessId) -> usize {
        self.waiting.get(&id).map_or(0, VecDeque::len)
    }

    /// Number of executions handed to workers.
    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> QueueSnapshot {
        let mut active: Vec<_> = self.active.iter().copied().collect();
        active.sort();
        let mut running: Vec<_> = self.running.iter().copied().collect();
        running.sort();
        QueueSnapshot {
            ready: self.ready.iter().cloned().collect(),
            waiting: self
                .waiting
                .iter()
                .map(|(id, waiters)| (*id, waiters.iter().cloned().collect()))
                .collect(),
            active,
            running,
        }
    }
}
