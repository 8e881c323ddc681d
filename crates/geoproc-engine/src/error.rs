// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for geoproc-engine.

use thiserror::Error;

use crate::types::{InstanceId, ProcessId};

/// Reasons a trigger is dropped at admission.
///
/// These are not failures: another instance is responsible for the process,
/// the process no longer exists, or the engine is stopping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AdmissionError {
    /// The process is not registered.
    #[error("Process {0} is not registered")]
    UnknownProcess(ProcessId),

    /// The process is owned by another service instance.
    #[error("Process {process_id} is owned by instance {owner}, not {instance}")]
    NotOwned {
        /// The process that was triggered.
        process_id: ProcessId,
        /// Instance configured to run it.
        owner: InstanceId,
        /// This instance.
        instance: InstanceId,
    },

    /// The engine is shutting down and no longer admits triggers.
    #[error("Engine is shutting down")]
    ShuttingDown,
}

/// Engine errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Trigger dropped at admission.
    #[error("Admission dropped: {0}")]
    Admission(#[from] AdmissionError),

    /// Registry operation failed.
    #[error("Registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    /// The process registry has been dropped.
    #[error("Process registry is no longer available")]
    RegistryUnavailable,

    /// The execution log store could not record a transition.
    #[error("Execution log error: {0}")]
    LogStore(#[from] crate::logger::LogError),

    /// A schedule could not be evaluated.
    #[error("Schedule error: {0}")]
    Schedule(#[from] crate::schedule::ScheduleError),
}

impl Error {
    /// Whether this error is an admission drop rather than a failure.
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Admission(_))
    }
}

/// Result type using the engine Error.
pub type Result<T> = std::result::Result<T, Error>;
