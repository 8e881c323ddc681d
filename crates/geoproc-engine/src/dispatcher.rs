// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dispatcher loop and worker execution.
//!
//! The dispatcher first takes a worker permit and then waits for a ready
//! request, so a popped request always has a worker. Each execution runs in
//! its own task holding the permit until its completion has been recorded and
//! the process released.

use std::any::Any;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, info, warn};

use crate::engine::EngineCore;
use crate::events::ProcessEvent;
use crate::payload::{ExecutionContext, PayloadError};
use crate::registry::ProcessParams;
use crate::types::{ExecutionRequest, ExecutionState, MessageLevel, ProcessId};

/// How one execution ended.
enum Outcome {
    Done,
    Failed(String),
}

impl EngineCore {
    /// Main loop: pair free workers with ready requests until shutdown.
    pub(crate) async fn run_dispatcher(self: Arc<Self>) {
        debug!("Dispatcher started");

        loop {
            if self.is_stopping() {
                break;
            }

            let permit = tokio::select! {
                permit = self.workers.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                // Re-check the stop flag; ready work is picked up after a permit
                _ = self.wake.notified() => continue,
            };

            let request = loop {
                if self.is_stopping() {
                    break None;
                }
                if let Some(request) = self.queue().pop_ready() {
                    break Some(request);
                }
                self.wake.notified().await;
            };

            let Some(request) = request else {
                break;
            };

            debug!(
                process_id = %request.process_id,
                registration_id = %request.registration_id,
                "Dispatching execution"
            );
            tokio::spawn(self.clone().execute(request, permit));
        }

        debug!("Dispatcher stopped");
    }

    /// Run one request and release its process.
    async fn execute(self: Arc<Self>, request: ExecutionRequest, permit: OwnedSemaphorePermit) {
        let id = request.process_id;
        let registration_id = request.registration_id;

        // None: the registry is gone and the execution fails below
        let params = match self.registry.upgrade() {
            Some(registry) => match registry.find(id) {
                Ok(params) => Some(params),
                Err(_) => {
                    drop(registry);
                    info!(
                        process_id = %id,
                        registration_id = %registration_id,
                        "Process removed before it started, execution cancelled"
                    );
                    if let Err(e) = self.cancel_requests(vec![request]).await {
                        warn!(
                            registration_id = %registration_id,
                            error = %e,
                            "Failed to record cancellation"
                        );
                    }
                    self.release(id).await;
                    drop(permit);
                    return;
                }
            },
            None => None,
        };

        self.events.emit(ProcessEvent::Started {
            process_id: id,
            registration_id,
        });
        let started = Utc::now();
        if let Err(e) = self.logger.set_start_time(registration_id, started).await {
            warn!(registration_id = %registration_id, error = %e, "Failed to record start time");
        }
        if let Err(e) = self
            .logger
            .result(ExecutionState::Running, started, registration_id)
            .await
        {
            warn!(registration_id = %registration_id, error = %e, "Failed to record running state");
        }

        let outcome = match params {
            Some(params) => self.run_payload(&request, params).await,
            None => {
                error!(
                    process_id = %id,
                    registration_id = %registration_id,
                    "Process registry unavailable, trigger dropped"
                );
                Outcome::Failed("process registry unavailable".to_string())
            }
        };

        let finished = Utc::now();
        let (state, success) = match &outcome {
            Outcome::Done => (ExecutionState::Done, true),
            Outcome::Failed(_) => (ExecutionState::Error, false),
        };
        if let Err(e) = self.logger.set_end_time(registration_id, finished).await {
            warn!(registration_id = %registration_id, error = %e, "Failed to record end time");
        }
        if let Outcome::Failed(text) = &outcome
            && let Err(e) = self
                .logger
                .add_message(registration_id, MessageLevel::Error, text)
                .await
        {
            warn!(registration_id = %registration_id, error = %e, "Failed to record error message");
        }
        if let Err(e) = self.logger.result(state, finished, registration_id).await {
            warn!(
                registration_id = %registration_id,
                state = %state,
                error = %e,
                "Failed to record final state"
            );
        }

        self.release(id).await;

        self.events.emit(ProcessEvent::Finished {
            process_id: id,
            registration_id,
            success,
        });
        drop(permit);
    }

    /// Clear the running mark and promote or cancel whatever waits behind it.
    async fn release(&self, id: ProcessId) {
        let keep_draining = self.may_promote(id);
        let release = {
            let mut queue = self.queue();
            // Read under the queue lock so shutdown's drain sees any promotion
            let keep_draining = keep_draining && !self.is_stopping();
            queue.release(id, keep_draining)
        };

        if let Some(next) = &release.promoted {
            debug!(
                process_id = %id,
                registration_id = %next.registration_id,
                "Waiting trigger promoted"
            );
            self.wake.notify_one();
        }
        if !release.cancelled.is_empty() {
            info!(
                process_id = %id,
                cancelled = release.cancelled.len(),
                "Waiting triggers cancelled on completion"
            );
            if let Err(e) = self.cancel_requests(release.cancelled).await {
                warn!(process_id = %id, error = %e, "Failed to record cancellations");
            }
        }
    }

    /// Run the payload in its own task, catching failures and panics.
    async fn run_payload(&self, request: &ExecutionRequest, params: Arc<ProcessParams>) -> Outcome {
        let id = request.process_id;
        let ctx = ExecutionContext {
            request: request.clone(),
            params,
        };
        let payload = self.payload.clone();
        let result = match tokio::spawn(async move { payload.execute(ctx).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(PayloadError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(PayloadError::Failed(e.to_string())),
        };

        match result {
            Ok(()) => {
                debug!(
                    process_id = %id,
                    registration_id = %request.registration_id,
                    "Execution finished"
                );
                Outcome::Done
            }
            Err(e) => {
                error!(
                    process_id = %id,
                    registration_id = %request.registration_id,
                    payload = self.payload.kind(),
                    error = %e,
                    "Execution failed"
                );
                Outcome::Failed(e.to_string())
            }
        }
    }

    /// Whether a completed process may move on to its next waiting trigger.
    ///
    /// Without a registry the WaitQueue still drains (each promoted request
    /// fails the same way); otherwise the process must still exist and be owned
    /// by this instance.
    fn may_promote(&self, id: ProcessId) -> bool {
        match self.registry.upgrade() {
            None => true,
            Some(registry) => registry
                .find(id)
                .map(|params| self.filter.owns(&params))
                .unwrap_or(false),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
