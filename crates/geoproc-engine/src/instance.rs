// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance affinity.
//!
//! Several copies of a service may run side by side, each owning a disjoint set
//! of processes. A process is owned by the instance whose id matches its
//! `service_instance_id`; triggers for processes owned elsewhere are dropped.

use crate::error::AdmissionError;
use crate::registry::ProcessParams;
use crate::types::InstanceId;

/// Decides which processes this service instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceFilter {
    current: InstanceId,
}

impl InstanceFilter {
    /// Filter for the given running instance.
    pub fn new(current: InstanceId) -> Self {
        Self { current }
    }

    /// Id of the running instance.
    pub fn current(&self) -> InstanceId {
        self.current
    }

    /// Whether this instance is responsible for the process.
    pub fn owns(&self, params: &ProcessParams) -> bool {
        params.service_instance_id == self.current
    }

    /// Like [`owns`](Self::owns), returning the drop reason.
    pub fn check(&self, params: &ProcessParams) -> Result<(), AdmissionError> {
        if self.owns(params) {
            Ok(())
        } else {
            Err(AdmissionError::NotOwned {
                process_id: params.id,
                owner: params.service_instance_id,
                instance: self.current,
            })
        }
    }
}
