// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process registry.
//!
//! Thread-safe mapping from [`ProcessId`] to [`ProcessParams`]. The registry owns
//! the parameters exclusively; the engine keeps only ids and re-resolves them
//! through [`ProcessRegistry::find`] every time it needs them.
//!
//! Every successful add/update/remove is announced to subscribers *after* the
//! registry lock is released, so a subscriber can call straight back into the
//! registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::schedule::{Schedule, ScheduleError};
use crate::types::{InstanceId, ProcessId};

/// Errors from registry operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Processes cannot be registered with the reserved invalid id.
    #[error("Can not register a process with an invalid id")]
    InvalidId,

    /// A process with this id is already registered.
    #[error("Process {0} is already registered")]
    AlreadyExists(ProcessId),

    /// No process with this id is registered.
    #[error("Process {0} is not registered")]
    NotFound(ProcessId),

    /// The process schedule is invalid.
    #[error("Process {process_id} has an invalid schedule: {source}")]
    InvalidSchedule {
        /// The process being registered.
        process_id: ProcessId,
        /// Why the schedule was rejected.
        #[source]
        source: ScheduleError,
    },

    /// A JSON process definition could not be parsed.
    #[error("Invalid process definition: {0}")]
    InvalidDefinition(String),

    /// Reading a definitions file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration of one schedulable process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessParams {
    /// Process id.
    pub id: ProcessId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Service instance responsible for running this process.
    pub service_instance_id: InstanceId,
    /// Inactive processes stay registered but get no timer.
    #[serde(default = "default_active")]
    pub active: bool,
    /// When the process is triggered.
    pub schedule: Schedule,
    /// Payload-specific parameters, opaque to the engine.
    #[serde(default)]
    pub payload: Value,
}

fn default_active() -> bool {
    true
}

impl ProcessParams {
    /// Active process with an empty payload.
    pub fn new(id: ProcessId, service_instance_id: InstanceId, schedule: Schedule) -> Self {
        Self {
            id,
            name: String::new(),
            service_instance_id,
            active: true,
            schedule,
            payload: Value::Null,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the payload parameters.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if !self.id.is_valid() {
            return Err(RegistryError::InvalidId);
        }
        self.schedule
            .validate()
            .map_err(|source| RegistryError::InvalidSchedule {
                process_id: self.id,
                source,
            })
    }
}

/// Kind of registry change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A process was registered.
    Added,
    /// A process definition was replaced.
    Updated,
    /// A process was removed.
    Removed,
}

/// Change notification delivered to registry subscribers.
#[derive(Debug, Clone)]
pub struct RegistryEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Process affected.
    pub process_id: ProcessId,
    /// Definition before the change (`None` for `Added`).
    pub old: Option<Arc<ProcessParams>>,
    /// Definition after the change (`None` for `Removed`).
    pub new: Option<Arc<ProcessParams>>,
}

/// Thread-safe process registry.
#[derive(Default)]
pub struct ProcessRegistry {
    processes: Mutex<HashMap<ProcessId, Arc<ProcessParams>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RegistryEvent>>>,
}

impl ProcessRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new process.
    pub fn add(&self, params: ProcessParams) -> Result<(), RegistryError> {
        params.validate()?;
        let params = Arc::new(params);
        {
            let mut processes = self.processes();
            if processes.contains_key(&params.id) {
                return Err(RegistryError::AlreadyExists(params.id));
            }
            processes.insert(params.id, params.clone());
        }

        debug!(process_id = %params.id, "Process added");
        self.notify(RegistryEvent {
            kind: ChangeKind::Added,
            process_id: params.id,
            old: None,
            new: Some(params),
        });
        Ok(())
    }

    /// Replace the definition of a registered process.
    pub fn update(&self, params: ProcessParams) -> Result<(), RegistryError> {
        params.validate()?;
        let params = Arc::new(params);
        let old = {
            let mut processes = self.processes();
            match processes.get_mut(&params.id) {
                Some(slot) => std::mem::replace(slot, params.clone()),
                None => return Err(RegistryError::NotFound(params.id)),
            }
        };

        debug!(process_id = %params.id, "Process updated");
        self.notify(RegistryEvent {
            kind: ChangeKind::Updated,
            process_id: params.id,
            old: Some(old),
            new: Some(params),
        });
        Ok(())
    }

    /// Remove a registered process.
    pub fn remove(&self, id: ProcessId) -> Result<(), RegistryError> {
        let old = self
            .processes()
            .remove(&id)
            .ok_or(RegistryError::NotFound(id))?;

        debug!(process_id = %id, "Process removed");
        self.notify(RegistryEvent {
            kind: ChangeKind::Removed,
            process_id: id,
            old: Some(old),
            new: None,
        });
        Ok(())
    }

    /// Look up a process definition.
    pub fn find(&self, id: ProcessId) -> Result<Arc<ProcessParams>, RegistryError> {
        self.processes()
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    /// Whether a process is registered.
    pub fn exists(&self, id: ProcessId) -> bool {
        self.processes().contains_key(&id)
    }

    /// All registered ids, sorted.
    pub fn ids(&self) -> Vec<ProcessId> {
        let mut ids: Vec<_> = self.processes().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of registered processes.
    pub fn len(&self) -> usize {
        self.processes().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.processes().is_empty()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RegistryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Register a process from its JSON definition.
    pub fn add_json(&self, definition: &Value) -> Result<ProcessId, RegistryError> {
        let params = parse_definition(definition)?;
        let id = params.id;
        self.add(params)?;
        Ok(id)
    }

    /// Replace a process definition from JSON.
    pub fn update_json(&self, definition: &Value) -> Result<ProcessId, RegistryError> {
        let params = parse_definition(definition)?;
        let id = params.id;
        self.update(params)?;
        Ok(id)
    }

    /// Register every definition in a JSON array.
    ///
    /// Stops at the first invalid definition; earlier ones stay registered.
    pub fn load_json_array(&self, definitions: &Value) -> Result<Vec<ProcessId>, RegistryError> {
        let items = definitions.as_array().ok_or_else(|| {
            RegistryError::InvalidDefinition("expected an array of process definitions".into())
        })?;

        items.iter().map(|item| self.add_json(item)).collect()
    }

    /// Register every definition from a JSON array file.
    pub fn load_file(&self, path: &Path) -> Result<Vec<ProcessId>, RegistryError> {
        let content = std::fs::read_to_string(path)?;
        let definitions: Value = serde_json::from_str(&content)
            .map_err(|e| RegistryError::InvalidDefinition(e.to_string()))?;
        let ids = self.load_json_array(&definitions)?;
        info!(
            path = %path.display(),
            count = ids.len(),
            "Loaded process definitions"
        );
        Ok(ids)
    }

    fn processes(&self) -> MutexGuard<'_, HashMap<ProcessId, Arc<ProcessParams>>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: RegistryEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn parse_definition(definition: &Value) -> Result<ProcessParams, RegistryError> {
    ProcessParams::deserialize(definition)
        .map_err(|e| RegistryError::InvalidDefinition(e.to_string()))
}
