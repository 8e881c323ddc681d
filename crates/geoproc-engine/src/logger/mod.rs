// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution history.
//!
//! Every admitted trigger gets a [`RegistrationId`] from [`ExecutionLogger::start`];
//! each lifecycle transition is then appended as a new state row for that id.
//! Rows are never rewritten.
//!
//! Backends:
//! - [`InMemoryExecutionLogger`]: process-local history, used when no database is configured
//! - [`PostgresExecutionLogger`]: durable history in PostgreSQL

pub mod memory;
pub mod postgres;

pub use memory::InMemoryExecutionLogger;
pub use postgres::PostgresExecutionLogger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ExecutionState, MessageLevel, ProcessId, RegistrationId};

/// Errors from the execution log store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogError {
    /// The store cannot be reached.
    #[error("Log store unavailable: {0}")]
    Unavailable(String),

    /// No execution was started with this registration id.
    #[error("Unknown registration id: {0}")]
    UnknownRegistration(RegistrationId),

    /// The process id does not fit the store's id column.
    #[error("Process id {0} is out of range for the log store")]
    ProcessIdOutOfRange(ProcessId),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying schema migrations failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Execution log store.
///
/// Calls are made without holding any engine lock; implementations own their
/// timeouts and retries.
#[async_trait]
pub trait ExecutionLogger: Send + Sync {
    /// Mint a registration id for a new execution attempt of `process_id`.
    async fn start(&self, process_id: ProcessId) -> Result<RegistrationId>;

    /// Record when processing began.
    async fn set_start_time(
        &self,
        registration_id: RegistrationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    /// Record when processing ended.
    async fn set_end_time(
        &self,
        registration_id: RegistrationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    /// Append a state transition.
    async fn result(
        &self,
        state: ExecutionState,
        timestamp: DateTime<Utc>,
        registration_id: RegistrationId,
    ) -> Result<()>;

    /// Attach diagnostic text to an execution.
    async fn add_message(
        &self,
        registration_id: RegistrationId,
        level: MessageLevel,
        text: &str,
    ) -> Result<()>;

    /// End time of the most recent successful execution of a process.
    async fn last_process_timestamp(&self, process_id: ProcessId)
    -> Result<Option<DateTime<Utc>>>;
}
