// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! geoproc Engine - Process Scheduling for Monitoring Services
//!
//! Every geoproc processing service (collection, analysis, interpolation,
//! alerting) periodically triggers numbered *processes*. This crate is the
//! scheduling engine those services share. It never runs two executions of
//! the same process at once, runs different processes in parallel on a
//! bounded worker pool, lets several service instances split the processes
//! between them, and records every execution in an execution log.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────┐   change events   ┌────────────────────────────────────┐
//!  │ ProcessRegistry  │──────────────────►│           ProcessEngine            │
//!  │ (id → params)    │◄── find ──────────│                                    │
//!  └──────────────────┘                   │  ┌──────────┐      ┌────────────┐  │
//!                                         │  │ TimerSet │─────►│  enqueue   │  │
//!          run_now / enqueue ────────────►│  └──────────┘      │ (instance  │  │
//!                                         │                    │  filter)   │  │
//!                                         │                    └─────┬──────┘  │
//!                                         │                          ▼         │
//!                                         │  ┌──────────────────────────────┐  │
//!                                         │  │        AdmissionQueue        │  │
//!                                         │  │ ReadyQueue │ WaitQueue[id]   │  │
//!                                         │  └──────────────┬───────────────┘  │
//!                                         │                 ▼                  │
//!                                         │  ┌────────────┐   ┌────────────┐   │
//!                                         │  │ Dispatcher │──►│ Workers(N) │   │
//!                                         │  └────────────┘   └─────┬──────┘   │
//!                                         └─────────────────────────┼──────────┘
//!                                                                   │
//!                       ┌─────────────────┐      ┌──────────────────┴──┐
//!                       │ ExecutionLogger │◄─────│      Payload        │
//!                       │ (memory / PG)   │      │ (command, custom)   │
//!                       └─────────────────┘      └─────────────────────┘
//! ```
//!
//! # Execution States
//!
//! ```text
//! QUEUED ──────────────► RUNNING ──► DONE | ERROR
//!    │                      ▲
//!    └─► ON_WAIT_QUEUE ─────┘ (promoted when the previous run completes)
//!
//! QUEUED | ON_WAIT_QUEUE ──► CANCELLED (process removed, moved, or shutdown)
//! ```
//!
//! # Configuration
//!
//! The `geoproc-engine` binary reads its configuration from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `GEOPROC_INSTANCE_ID` | No | `1` | Instance id used for process ownership |
//! | `GEOPROC_INSTANCE_NAME` | No | `geoproc` | Instance name for logs and status |
//! | `GEOPROC_SERVICE_KIND` | No | `collector` | `collector`, `analysis`, `interpolator`, `alert` |
//! | `GEOPROC_WORKERS` | No | `4` | Worker pool size |
//! | `GEOPROC_DATABASE_URL` | No | - | PostgreSQL execution log (in-memory when unset) |
//! | `GEOPROC_PROCESSES_FILE` | No | - | JSON array of process definitions |
//! | `GEOPROC_PAYLOAD_TIMEOUT_SECS` | No | `3600` | Command payload timeout |
//!
//! # Modules
//!
//! - [`engine`]: The engine, its builder, and status reporting
//! - [`queue`]: Admission queue enforcing one execution per process
//! - [`registry`]: Process definitions and change notifications
//! - [`timers`]: Per-process recurring timers
//! - [`logger`]: Execution log trait with in-memory and PostgreSQL stores
//! - [`payload`]: Payload trait, command payload, and test mock

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Process engine: admission, reconciliation, shutdown.
pub mod engine;

/// Error types for engine operations.
pub mod error;

/// Process lifecycle events.
pub mod events;

/// Instance affinity filter.
pub mod instance;

/// Execution log.
pub mod logger;

/// PostgreSQL schema migrations.
pub mod migrations;

/// Work executed for each trigger.
pub mod payload;

/// Admission queue with per-process wait queues.
pub mod queue;

/// Process registry.
pub mod registry;

/// Schedules and next-fire computation.
pub mod schedule;

/// Per-process recurring timers.
pub mod timers;

/// Identifiers and execution records.
pub mod types;

mod dispatcher;

pub use config::Config;
pub use engine::{Admission, EngineStatus, ProcessEngine};
pub use error::{AdmissionError, Error, Result};
pub use events::ProcessEvent;
pub use logger::{ExecutionLogger, InMemoryExecutionLogger, PostgresExecutionLogger};
pub use payload::{ExecutionContext, Payload, PayloadError};
pub use registry::{ProcessParams, ProcessRegistry};
pub use schedule::Schedule;
pub use types::{
    ExecutionRequest, ExecutionState, InstanceId, ProcessId, RegistrationId, ServiceKind,
};
