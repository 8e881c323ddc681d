// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the PostgreSQL execution log.
//!
//! Requires TEST_GEOPROC_DATABASE_URL; tests are skipped when it is unset.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, TimeDelta, Utc};
use common::{LOCAL_INSTANCE, manual};
use geoproc_engine::engine::ProcessEngine;
use geoproc_engine::logger::{ExecutionLogger, LogError, PostgresExecutionLogger};
use geoproc_engine::payload::MockPayload;
use geoproc_engine::registry::ProcessRegistry;
use geoproc_engine::types::{ExecutionState, MessageLevel, ProcessId, RegistrationId};
use sqlx::postgres::PgPoolOptions;

/// Skip test if database URL is not set
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_GEOPROC_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_GEOPROC_DATABASE_URL not set");
            return;
        }
    };
}

async fn create_logger() -> Option<PostgresExecutionLogger> {
    let url = std::env::var("TEST_GEOPROC_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .ok()?;
    let logger = PostgresExecutionLogger::new(pool).with_timeout(Duration::from_secs(5));
    logger.migrate().await.ok()?;
    Some(logger)
}

/// Process id unlikely to collide with rows left by earlier runs.
fn unique_process_id() -> ProcessId {
    ProcessId((Utc::now().timestamp_micros() as u64) % 1_000_000_000_000 + 1)
}

#[tokio::test]
async fn test_execution_lifecycle_is_recorded() {
    skip_if_no_db!();
    let logger = create_logger().await.expect("Failed to connect to database");
    let process_id = unique_process_id();

    let registration_id = logger.start(process_id).await.unwrap();
    let queued_at = Utc::now().trunc_subsecs(6);
    logger
        .result(ExecutionState::Queued, queued_at, registration_id)
        .await
        .unwrap();

    let started = queued_at + TimeDelta::seconds(1);
    logger.set_start_time(registration_id, started).await.unwrap();
    logger
        .result(ExecutionState::Running, started, registration_id)
        .await
        .unwrap();

    let ended = started + TimeDelta::seconds(2);
    logger.set_end_time(registration_id, ended).await.unwrap();
    logger
        .result(ExecutionState::Done, ended, registration_id)
        .await
        .unwrap();

    assert_eq!(
        logger.states(registration_id).await.unwrap(),
        vec![
            ExecutionState::Queued,
            ExecutionState::Running,
            ExecutionState::Done
        ]
    );
    assert_eq!(
        logger.last_process_timestamp(process_id).await.unwrap(),
        Some(ended)
    );
}

#[tokio::test]
async fn test_registration_ids_increase() {
    skip_if_no_db!();
    let logger = create_logger().await.expect("Failed to connect to database");
    let process_id = unique_process_id();

    let first = logger.start(process_id).await.unwrap();
    let second = logger.start(process_id).await.unwrap();
    assert!(second > first);
}

#[tokio::test]
async fn test_failed_runs_do_not_count_as_success() {
    skip_if_no_db!();
    let logger = create_logger().await.expect("Failed to connect to database");
    let process_id = unique_process_id();

    let registration_id = logger.start(process_id).await.unwrap();
    logger
        .set_end_time(registration_id, Utc::now())
        .await
        .unwrap();
    logger
        .result(ExecutionState::Error, Utc::now(), registration_id)
        .await
        .unwrap();
    logger
        .add_message(registration_id, MessageLevel::Error, "station offline")
        .await
        .unwrap();

    assert_eq!(
        logger.last_process_timestamp(process_id).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_unknown_registration_rejected() {
    skip_if_no_db!();
    let logger = create_logger().await.expect("Failed to connect to database");
    let unknown = RegistrationId(-1);

    assert!(matches!(
        logger.set_start_time(unknown, Utc::now()).await,
        Err(LogError::UnknownRegistration(_))
    ));
    assert!(matches!(
        logger
            .result(ExecutionState::Running, Utc::now(), unknown)
            .await,
        Err(LogError::UnknownRegistration(_))
    ));
    assert!(matches!(
        logger
            .add_message(unknown, MessageLevel::Info, "orphan")
            .await,
        Err(LogError::UnknownRegistration(_))
    ));
}

#[tokio::test]
async fn test_engine_writes_to_postgres() {
    skip_if_no_db!();
    let logger = Arc::new(create_logger().await.expect("Failed to connect to database"));
    let registry = Arc::new(ProcessRegistry::new());
    let process_id = unique_process_id();

    let engine = ProcessEngine::builder()
        .registry(registry.clone())
        .logger(logger.clone())
        .payload(Arc::new(MockPayload::new()))
        .instance_id(LOCAL_INSTANCE)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();
    engine.add_process(manual(process_id.0)).await.unwrap();

    let admission = engine.run_now(process_id).await.unwrap();
    let registration_id = admission.registration_id();

    let mut states = Vec::new();
    for _ in 0..100 {
        states = logger.states(registration_id).await.unwrap();
        if states.last() == Some(&ExecutionState::Done) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        states,
        vec![
            ExecutionState::Queued,
            ExecutionState::Running,
            ExecutionState::Done
        ]
    );
    assert!(engine.last_success(process_id).await.unwrap().is_some());

    engine.shutdown().await;
}
