// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identifiers and execution records shared across the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a schedulable unit of work (collector, analysis, interpolation, alert).
///
/// Assigned by the registry's owner at creation and immutable afterwards.
/// `ProcessId(0)` is reserved as the invalid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u64);

impl ProcessId {
    /// The reserved invalid id.
    pub const INVALID: ProcessId = ProcessId(0);

    /// Whether this id may be registered.
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id minted by the execution log once per admitted trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(pub i64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one running copy of a service, used for static partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of processing service an engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Pulls measurements from stations and external feeds.
    #[default]
    Collector,
    /// Computes statistics and derived series.
    Analysis,
    /// Builds gridded surfaces from point data.
    Interpolator,
    /// Evaluates alert conditions.
    Alert,
}

impl ServiceKind {
    /// Configuration representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collector => "collector",
            Self::Analysis => "analysis",
            Self::Interpolator => "interpolator",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "collector" => Ok(Self::Collector),
            "analysis" => Ok(Self::Analysis),
            "interpolator" => Ok(Self::Interpolator),
            "alert" => Ok(Self::Alert),
            other => Err(format!("unknown service kind '{}'", other)),
        }
    }
}

/// A single admitted request to execute a process once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Process to execute.
    pub process_id: ProcessId,
    /// When the trigger fired (timer tick or manual request).
    pub trigger_time: DateTime<Utc>,
    /// Correlation id for every log row of this execution attempt.
    pub registration_id: RegistrationId,
}

/// Lifecycle states recorded in the execution log.
///
/// ```text
/// QUEUED ──► RUNNING ──► DONE | ERROR
///    │           ▲
///    ▼           │ promoted
/// ON_WAIT_QUEUE ─┘
///
/// QUEUED | ON_WAIT_QUEUE ──► CANCELLED  (removal, ownership loss, shutdown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Admitted by `enqueue`.
    Queued,
    /// Deferred because the same process was already active.
    OnWaitQueue,
    /// Picked up by a worker.
    Running,
    /// Payload finished successfully.
    Done,
    /// Payload failed, panicked, or could not be resolved.
    Error,
    /// Dropped before it ran.
    Cancelled,
}

impl ExecutionState {
    /// Whether no further transitions follow this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }

    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::OnWaitQueue => "on_wait_queue",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "on_wait_queue" => Ok(Self::OnWaitQueue),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown execution state '{}'", other)),
        }
    }
}

/// One append-only row of the execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution attempt this row belongs to.
    pub registration_id: RegistrationId,
    /// Process the attempt executes.
    pub process_id: ProcessId,
    /// State entered.
    pub state: ExecutionState,
    /// When the state was entered.
    pub timestamp: DateTime<Utc>,
}

/// Severity of a diagnostic message attached to an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    /// Informational note.
    Info,
    /// Something unexpected that did not fail the run.
    Warning,
    /// Failure diagnostic.
    Error,
}

impl MessageLevel {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Diagnostic text attached to an execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMessage {
    /// Execution attempt the message belongs to.
    pub registration_id: RegistrationId,
    /// Severity.
    pub level: MessageLevel,
    /// Message text.
    pub text: String,
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}
