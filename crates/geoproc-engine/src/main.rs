// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! geoproc Engine - Processing Service
//!
//! Runs the processes assigned to this instance:
//! - Loads process definitions from a JSON file
//! - Schedules them on their intervals or cron expressions
//! - Executes each trigger through the command payload
//! - Records executions in PostgreSQL or in memory

use std::sync::Arc;

use tracing::{info, warn};

use geoproc_engine::config::Config;
use geoproc_engine::engine::ProcessEngine;
use geoproc_engine::logger::{ExecutionLogger, InMemoryExecutionLogger, PostgresExecutionLogger};
use geoproc_engine::payload::{CommandPayload, Payload};
use geoproc_engine::registry::ProcessRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoproc_engine=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        instance_id = %config.instance_id,
        instance_name = %config.instance_name,
        service_kind = %config.service_kind,
        workers = config.workers,
        "Starting geoproc engine"
    );

    let logger: Arc<dyn ExecutionLogger> = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            info!("Connected to database");

            let logger = PostgresExecutionLogger::new(pool);
            logger.migrate().await?;
            Arc::new(logger)
        }
        None => {
            warn!("GEOPROC_DATABASE_URL not set, execution log kept in memory");
            Arc::new(InMemoryExecutionLogger::new())
        }
    };

    let registry = Arc::new(ProcessRegistry::new());
    if let Some(path) = &config.processes_file {
        registry.load_file(path)?;
    }

    let payload = Arc::new(CommandPayload::new(config.payload_timeout));
    info!(payload = payload.kind(), "Payload initialized");

    let engine = ProcessEngine::builder()
        .registry(registry.clone())
        .logger(logger)
        .payload(payload)
        .instance_id(config.instance_id)
        .instance_name(&config.instance_name)
        .service_kind(config.service_kind)
        .workers(config.workers)
        .build()?
        .start()
        .await?;

    let status = engine.status();
    info!(
        processes = status.processes,
        timers = status.timers,
        "Processing service ready"
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    engine.shutdown().await;

    info!("geoproc engine shut down");

    Ok(())
}
