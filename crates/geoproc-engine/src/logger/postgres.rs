// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL execution log.
//!
//! Tables (see `migrations/`, applied by [`crate::migrations`]):
//! - `process_executions`: one row per registration id, with processing start/end
//! - `process_execution_states`: append-only state transitions
//! - `process_execution_messages`: diagnostic text
//!
//! Every query is bounded by a timeout so a hung database surfaces as
//! [`LogError::Unavailable`] instead of stalling the caller.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use super::{ExecutionLogger, LogError, Result};
use crate::types::{ExecutionState, MessageLevel, ProcessId, RegistrationId};

/// Default timeout for log store queries (10 seconds).
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Execution log stored in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresExecutionLogger {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresExecutionLogger {
    /// Create a logger on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Set the per-query timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply pending execution log migrations.
    pub async fn migrate(&self) -> Result<()> {
        crate::migrations::run(&self.pool).await?;
        info!("Execution log schema verified");
        Ok(())
    }

    /// States recorded for one execution, in append order.
    pub async fn states(&self, registration_id: RegistrationId) -> Result<Vec<ExecutionState>> {
        let rows: Vec<String> = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    SELECT state
                    FROM process_execution_states
                    WHERE registration_id = $1
                    ORDER BY id
                    "#,
                )
                .bind(registration_id.0)
                .fetch_all(&self.pool),
            )
            .await?;

        // Rows are only written through `result`, so unknown strings are skipped
        Ok(rows.iter().filter_map(|s| s.parse().ok()).collect())
    }

    async fn timed<T, F>(&self, query: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, query).await {
            Ok(result) => result.map_err(LogError::from),
            Err(_) => Err(LogError::Unavailable(format!(
                "log store did not answer within {:?}",
                self.timeout
            ))),
        }
    }

    async fn set_time(
        &self,
        column_query: &'static str,
        registration_id: RegistrationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let done = self
            .timed(
                sqlx::query(column_query)
                    .bind(registration_id.0)
                    .bind(timestamp)
                    .execute(&self.pool),
            )
            .await?;
        if done.rows_affected() == 0 {
            return Err(LogError::UnknownRegistration(registration_id));
        }
        Ok(())
    }
}

/// Process ids are stored as BIGINT.
fn pg_process_id(id: ProcessId) -> Result<i64> {
    i64::try_from(id.0).map_err(|_| LogError::ProcessIdOutOfRange(id))
}

#[async_trait]
impl ExecutionLogger for PostgresExecutionLogger {
    async fn start(&self, process_id: ProcessId) -> Result<RegistrationId> {
        let id: i64 = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO process_executions (process_id, created_at)
                    VALUES ($1, NOW())
                    RETURNING registration_id
                    "#,
                )
                .bind(pg_process_id(process_id)?)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(RegistrationId(id))
    }

    async fn set_start_time(
        &self,
        registration_id: RegistrationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.set_time(
            "UPDATE process_executions SET start_time = $2 WHERE registration_id = $1",
            registration_id,
            timestamp,
        )
        .await
    }

    async fn set_end_time(
        &self,
        registration_id: RegistrationId,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.set_time(
            "UPDATE process_executions SET end_time = $2 WHERE registration_id = $1",
            registration_id,
            timestamp,
        )
        .await
    }

    async fn result(
        &self,
        state: ExecutionState,
        timestamp: DateTime<Utc>,
        registration_id: RegistrationId,
    ) -> Result<()> {
        let done = self
            .timed(
                sqlx::query(
                    r#"
                    INSERT INTO process_execution_states (registration_id, state, recorded_at)
                    SELECT $1, $2, $3
                    WHERE EXISTS (
                        SELECT 1 FROM process_executions WHERE registration_id = $1
                    )
                    "#,
                )
                .bind(registration_id.0)
                .bind(state.as_str())
                .bind(timestamp)
                .execute(&self.pool),
            )
            .await?;
        if done.rows_affected() == 0 {
            return Err(LogError::UnknownRegistration(registration_id));
        }
        Ok(())
    }

    async fn add_message(
        &self,
        registration_id: RegistrationId,
        level: MessageLevel,
        text: &str,
    ) -> Result<()> {
        let done = self
            .timed(
                sqlx::query(
                    r#"
                    INSERT INTO process_execution_messages (registration_id, level, message)
                    SELECT $1, $2, $3
                    WHERE EXISTS (
                        SELECT 1 FROM process_executions WHERE registration_id = $1
                    )
                    "#,
                )
                .bind(registration_id.0)
                .bind(level.as_str())
                .bind(text)
                .execute(&self.pool),
            )
            .await?;
        if done.rows_affected() == 0 {
            return Err(LogError::UnknownRegistration(registration_id));
        }
        Ok(())
    }

    async fn last_process_timestamp(
        &self,
        process_id: ProcessId,
    ) -> Result<Option<DateTime<Utc>>> {
        self.timed(
            sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                r#"
                SELECT MAX(e.end_time)
                FROM process_executions e
                JOIN process_execution_states s ON s.registration_id = e.registration_id
                WHERE e.process_id = $1 AND s.state = 'done'
                "#,
            )
            .bind(pg_process_id(process_id)?)
            .fetch_one(&self.pool),
        )
        .await
    }
}
