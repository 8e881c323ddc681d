// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payload trait definitions.
//!
//! The payload is the per-service work (collecting, analysing, interpolating,
//! alerting). The engine treats it as an opaque callable that succeeds or fails;
//! payload-specific policy such as data filters stays inside implementations.

pub mod command;
pub mod mock;

pub use command::CommandPayload;
pub use mock::MockPayload;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::registry::ProcessParams;
use crate::types::{ExecutionRequest, ProcessId, RegistrationId};

/// Errors from payload execution.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PayloadError {
    /// The payload reported a failure.
    #[error("Payload failed: {0}")]
    Failed(String),

    /// The payload panicked.
    #[error("Payload panicked: {0}")]
    Panicked(String),

    /// The payload did not finish in time.
    #[error("Payload timed out after {0:?}")]
    Timeout(Duration),

    /// Payload parameters of the process are unusable.
    #[error("Invalid payload parameters: {0}")]
    InvalidParams(String),

    /// External program exited with a non-zero code.
    #[error("Exit code {exit_code}: {stderr}")]
    ExitCode {
        /// Exit code from the program.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for payload operations.
pub type Result<T> = std::result::Result<T, PayloadError>;

/// Everything a payload gets for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The admitted request.
    pub request: ExecutionRequest,
    /// Process parameters, resolved from the registry when the execution started.
    pub params: Arc<ProcessParams>,
}

impl ExecutionContext {
    /// Process being executed.
    pub fn process_id(&self) -> ProcessId {
        self.request.process_id
    }

    /// When the trigger fired.
    pub fn trigger_time(&self) -> DateTime<Utc> {
        self.request.trigger_time
    }

    /// Correlation id of this execution.
    pub fn registration_id(&self) -> RegistrationId {
        self.request.registration_id
    }
}

/// Work executed for one trigger of a process.
#[async_trait]
pub trait Payload: Send + Sync {
    /// Short name of the payload type, for logs and status.
    fn kind(&self) -> &'static str;

    /// Execute the process once.
    async fn execute(&self, ctx: ExecutionContext) -> Result<()>;
}

/// Payload backed by an async closure.
pub struct FnPayload<F> {
    kind: &'static str,
    f: F,
}

impl<F, Fut> FnPayload<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    /// Wrap a closure as a payload.
    pub fn new(kind: &'static str, f: F) -> Self {
        Self { kind, f }
    }
}

#[async_trait]
impl<F, Fut> Payload for FnPayload<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<()> {
        (self.f)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;
    use crate::types::InstanceId;

    fn context(id: u64) -> ExecutionContext {
        ExecutionContext {
            request: ExecutionRequest {
                process_id: ProcessId(id),
                trigger_time: Utc::now(),
                registration_id: RegistrationId(10),
            },
            params: Arc::new(ProcessParams::new(
                ProcessId(id),
                InstanceId(1),
                Schedule::Manual,
            )),
        }
    }

    #[tokio::test]
    async fn test_fn_payload_runs_closure() {
        let payload = FnPayload::new("closure", |ctx: ExecutionContext| async move {
            if ctx.process_id() == ProcessId(5) {
                Err(PayloadError::Failed("no data for process 5".to_string()))
            } else {
                Ok(())
            }
        });

        assert_eq!(payload.kind(), "closure");
        assert!(payload.execute(context(1)).await.is_ok());
        let err = payload.execute(context(5)).await.unwrap_err();
        assert_eq!(err.to_string(), "Payload failed: no data for process 5");
    }

    #[test]
    fn test_context_accessors() {
        let ctx = context(3);
        assert_eq!(ctx.process_id(), ProcessId(3));
        assert_eq!(ctx.registration_id(), RegistrationId(10));
        assert_eq!(ctx.params.id, ProcessId(3));
    }
}
