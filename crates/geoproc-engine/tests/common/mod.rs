// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for geoproc-engine integration tests.
//!
//! Provides TestContext wiring a registry, an in-memory execution log, and a
//! mock payload into a started engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use geoproc_engine::engine::ProcessEngine;
use geoproc_engine::logger::InMemoryExecutionLogger;
use geoproc_engine::payload::MockPayload;
use geoproc_engine::registry::{ProcessParams, ProcessRegistry};
use geoproc_engine::schedule::Schedule;
use geoproc_engine::types::{ExecutionState, InstanceId, ProcessId, RegistrationId};

/// Instance id the test engines run as unless told otherwise.
pub const LOCAL_INSTANCE: InstanceId = InstanceId(1);

/// Test context that owns the registry and keeps handles to the test doubles.
pub struct TestContext {
    pub registry: Arc<ProcessRegistry>,
    pub logger: Arc<InMemoryExecutionLogger>,
    pub payload: Arc<MockPayload>,
    pub engine: ProcessEngine,
}

impl TestContext {
    /// Engine with `workers` workers running `payload` as instance 1.
    pub async fn new(payload: MockPayload, workers: usize) -> Self {
        Self::on_registry(Arc::new(ProcessRegistry::new()), payload, LOCAL_INSTANCE, workers).await
    }

    /// Engine with a gated payload, so tests decide when executions finish.
    pub async fn gated(workers: usize) -> Self {
        Self::new(MockPayload::gated(), workers).await
    }

    /// Engine on an existing registry, running as `instance`.
    pub async fn on_registry(
        registry: Arc<ProcessRegistry>,
        payload: MockPayload,
        instance: InstanceId,
        workers: usize,
    ) -> Self {
        let logger = Arc::new(InMemoryExecutionLogger::new());
        let payload = Arc::new(payload);
        let engine = ProcessEngine::builder()
            .registry(registry.clone())
            .logger(logger.clone())
            .payload(payload.clone())
            .instance_id(instance)
            .workers(workers)
            .build()
            .expect("Failed to build engine")
            .start()
            .await
            .expect("Failed to start engine");

        Self {
            registry,
            logger,
            payload,
            engine,
        }
    }

    /// Register a manually triggered process owned by this instance.
    pub async fn add_manual(&self, id: u64) -> ProcessId {
        let id = ProcessId(id);
        self.engine
            .add_process(manual(id.0))
            .await
            .expect("Failed to add process");
        id
    }

    /// Wait until the execution reached `state` as its latest log row.
    pub async fn wait_for_state(&self, registration_id: RegistrationId, state: ExecutionState) {
        let logger = self.logger.clone();
        let reached = wait_until(Duration::from_secs(5), || {
            logger.final_state(registration_id) == Some(state)
        })
        .await;
        assert!(
            reached,
            "registration {} never reached {:?}, states: {:?}",
            registration_id,
            state,
            self.logger.states(registration_id)
        );
    }

    /// Wait until nothing is queued, waiting, or running.
    pub async fn wait_idle(&self) {
        let engine = self.engine.clone();
        let idle = wait_until(Duration::from_secs(5), || engine.snapshot().is_idle()).await;
        assert!(idle, "engine never went idle: {:?}", self.engine.snapshot());
    }

    /// Wait until `count` executions are inside the payload.
    pub async fn wait_running(&self, count: usize) {
        let payload = self.payload.clone();
        let reached = wait_until(Duration::from_secs(5), || payload.running() == count).await;
        assert!(
            reached,
            "expected {} running executions, found {}",
            count,
            self.payload.running()
        );
    }
}

/// Manually triggered process owned by instance 1.
pub fn manual(id: u64) -> ProcessParams {
    ProcessParams::new(ProcessId(id), LOCAL_INSTANCE, Schedule::Manual)
        .with_name(format!("process-{}", id))
}

/// Poll `condition` every few milliseconds until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
