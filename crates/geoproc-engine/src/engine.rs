// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process engine.
//!
//! [`ProcessEngine`] ties the pieces together: triggers from timers and manual
//! runs go through [`ProcessEngine::enqueue`], which checks the registry and the
//! instance filter, mints a registration id, and admits the request into the
//! [`AdmissionQueue`]. The dispatcher task hands ready requests to a bounded set
//! of workers (see `dispatcher.rs`).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use geoproc_engine::{
//!     InMemoryExecutionLogger, InstanceId, ProcessEngine, ProcessRegistry, payload::CommandPayload,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(ProcessRegistry::new());
//!     registry.load_file("processes.json".as_ref())?;
//!
//!     let engine = ProcessEngine::builder()
//!         .registry(registry.clone())
//!         .logger(Arc::new(InMemoryExecutionLogger::new()))
//!         .payload(Arc::new(CommandPayload::default()))
//!         .instance_id(InstanceId(1))
//!         .workers(4)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... timers trigger processes; operators call engine.run_now(id) ...
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::Result as AnyResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, Semaphore, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AdmissionError, Error, Result};
use crate::events::{DEFAULT_EVENT_CAPACITY, EventBus, ProcessEvent};
use crate::instance::InstanceFilter;
use crate::logger::{self, ExecutionLogger};
use crate::payload::Payload;
use crate::queue::{AdmissionQueue, Placement, QueueSnapshot};
use crate::registry::{ProcessParams, ProcessRegistry};
use crate::timers::{FireFn, TimerSet};
use crate::types::{
    ExecutionRequest, ExecutionState, InstanceId, ProcessId, RegistrationId, ServiceKind,
};

/// Default number of parallel workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Outcome of a successful [`ProcessEngine::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The process was idle; the request is in the ReadyQueue.
    Ready(RegistrationId),
    /// The process was active; the request waits behind it.
    Deferred(RegistrationId),
}

impl Admission {
    /// Registration id minted for the trigger.
    pub fn registration_id(&self) -> RegistrationId {
        match self {
            Self::Ready(id) | Self::Deferred(id) => *id,
        }
    }

    /// Whether the request went to the WaitQueue.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

/// Point-in-time engine status.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Instance id used for process ownership.
    pub instance_id: InstanceId,
    /// Instance name.
    pub instance_name: String,
    /// Kind of service.
    pub service_kind: ServiceKind,
    /// Payload implementation.
    pub payload_kind: &'static str,
    /// When the engine was started.
    pub started_at: DateTime<Utc>,
    /// Worker pool size.
    pub workers: usize,
    /// Processes with a queued or running execution.
    pub active: usize,
    /// Requests waiting for a worker.
    pub ready: usize,
    /// Requests deferred behind a running execution of the same process.
    pub waiting: usize,
    /// Executions in progress.
    pub running: usize,
    /// Processes with a live timer.
    pub timers: usize,
    /// Registered processes (0 if the registry is gone).
    pub processes: usize,
    /// Whether shutdown has begun.
    pub shutting_down: bool,
}

/// Builder for creating a [`ProcessEngine`].
pub struct ProcessEngineBuilder {
    registry: Option<Arc<ProcessRegistry>>,
    logger: Option<Arc<dyn ExecutionLogger>>,
    payload: Option<Arc<dyn Payload>>,
    instance_id: InstanceId,
    instance_name: String,
    service_kind: ServiceKind,
    workers: usize,
    event_capacity: usize,
}

impl Default for ProcessEngineBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            logger: None,
            payload: None,
            instance_id: InstanceId(1),
            instance_name: "geoproc".to_string(),
            service_kind: ServiceKind::default(),
            workers: DEFAULT_WORKERS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ProcessEngineBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the process registry (required).
    ///
    /// The running engine keeps only a weak reference; the caller owns the registry.
    pub fn registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the execution log (required).
    pub fn logger(mut self, logger: Arc<dyn ExecutionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the payload executed for every trigger (required).
    pub fn payload(mut self, payload: Arc<dyn Payload>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the id of this service instance.
    ///
    /// Default: 1
    pub fn instance_id(mut self, id: InstanceId) -> Self {
        self.instance_id = id;
        self
    }

    /// Set the instance name reported in status and logs.
    ///
    /// Default: `geoproc`
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    /// Set the kind of service.
    ///
    /// Default: collector
    pub fn service_kind(mut self, kind: ServiceKind) -> Self {
        self.service_kind = kind;
        self
    }

    /// Set the worker pool size.
    ///
    /// Default: 4
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the lifecycle event channel capacity.
    ///
    /// Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the engine configuration.
    ///
    /// Returns an error if required fields are missing or the worker count is unusable.
    pub fn build(self) -> AnyResult<ProcessEngineConfig> {
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("registry is required"))?;
        let logger = self
            .logger
            .ok_or_else(|| anyhow::anyhow!("logger is required"))?;
        let payload = self
            .payload
            .ok_or_else(|| anyhow::anyhow!("payload is required"))?;

        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        let worker_permits = u32::try_from(self.workers)
            .ok()
            .filter(|n| (*n as usize) <= Semaphore::MAX_PERMITS)
            .ok_or_else(|| anyhow::anyhow!("too many workers: {}", self.workers))?;

        Ok(ProcessEngineConfig {
            registry,
            logger,
            payload,
            instance_id: self.instance_id,
            instance_name: self.instance_name,
            service_kind: self.service_kind,
            workers: self.workers,
            worker_permits,
            event_capacity: self.event_capacity,
        })
    }
}

/// Configuration for a [`ProcessEngine`].
pub struct ProcessEngineConfig {
    registry: Arc<ProcessRegistry>,
    logger: Arc<dyn ExecutionLogger>,
    payload: Arc<dyn Payload>,
    instance_id: InstanceId,
    instance_name: String,
    service_kind: ServiceKind,
    workers: usize,
    worker_permits: u32,
    event_capacity: usize,
}

impl ProcessEngineConfig {
    /// Start the engine: schedule timers for owned processes and spawn the
    /// dispatcher and the registry watcher.
    pub async fn start(self) -> AnyResult<ProcessEngine> {
        let changes = self.registry.subscribe();
        let (stop_tx, stop_rx) = watch::channel(false);

        let core = Arc::new(EngineCore {
            registry: Arc::downgrade(&self.registry),
            logger: self.logger,
            payload: self.payload,
            filter: InstanceFilter::new(self.instance_id),
            queue: Mutex::new(AdmissionQueue::new()),
            timers: Mutex::new(TimerSet::new()),
            events: EventBus::new(self.event_capacity),
            workers: Arc::new(Semaphore::new(self.workers)),
            worker_count: self.workers,
            worker_permits: self.worker_permits,
            wake: Notify::new(),
            stopping: AtomicBool::new(false),
            instance_name: self.instance_name,
            service_kind: self.service_kind,
            started_at: Utc::now(),
        });

        for id in self.registry.ids() {
            if let Err(e) = core.reconcile(id).await {
                warn!(process_id = %id, error = %e, "Failed to schedule process at startup");
            }
        }

        let dispatcher = tokio::spawn(core.clone().run_dispatcher());
        let watcher = tokio::spawn(watch_registry(core.clone(), changes, stop_rx));

        info!(
            instance_id = %self.instance_id,
            instance_name = %core.instance_name,
            service_kind = %core.service_kind,
            payload = core.payload.kind(),
            workers = self.workers,
            processes = self.registry.len(),
            timers = core.timers().len(),
            "ProcessEngine started"
        );

        Ok(ProcessEngine {
            core,
            tasks: Arc::new(tokio::sync::Mutex::new(Some(EngineTasks {
                dispatcher,
                watcher,
                stop_tx,
            }))),
        })
    }
}

struct EngineTasks {
    dispatcher: JoinHandle<()>,
    watcher: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// A running process engine.
///
/// Cheap to clone; every clone drives the same engine. Call
/// [`shutdown`](Self::shutdown) for graceful termination.
#[derive(Clone)]
pub struct ProcessEngine {
    core: Arc<EngineCore>,
    tasks: Arc<tokio::sync::Mutex<Option<EngineTasks>>>,
}

impl ProcessEngine {
    /// Create a new builder for configuring the engine.
    pub fn builder() -> ProcessEngineBuilder {
        ProcessEngineBuilder::new()
    }

    /// Admit a trigger for a process.
    ///
    /// Dropped triggers (unknown process, process owned by another instance,
    /// engine stopping) return [`Error::Admission`]; check
    /// [`Error::is_drop`]. Nothing is logged for them.
    pub async fn enqueue(&self, id: ProcessId, trigger_time: DateTime<Utc>) -> Result<Admission> {
        self.core.enqueue(id, trigger_time).await
    }

    /// Trigger a process now, outside its schedule.
    ///
    /// Serializes with scheduled runs of the same process exactly like a timer firing.
    pub async fn run_now(&self, id: ProcessId) -> Result<Admission> {
        self.core.enqueue(id, Utc::now()).await
    }

    /// Register a process and schedule it if this instance owns it.
    pub async fn add_process(&self, params: ProcessParams) -> Result<()> {
        let id = params.id;
        self.core.registry()?.add(params)?;
        self.core.reconcile(id).await
    }

    /// Replace a process definition.
    ///
    /// The timer is kept if the schedule did not change. If the process moved
    /// to another instance, its timer is stopped and its queued triggers are
    /// cancelled. A running execution is never interrupted.
    pub async fn update_process(&self, params: ProcessParams) -> Result<()> {
        let id = params.id;
        self.core.registry()?.update(params)?;
        self.core.reconcile(id).await
    }

    /// Remove a process, cancelling its timer and queued triggers.
    ///
    /// A running execution finishes normally; nothing waiting behind it runs.
    pub async fn remove_process(&self, id: ProcessId) -> Result<()> {
        self.core.registry()?.remove(id)?;
        self.core.reconcile(id).await
    }

    /// Bring timer and queue state for one process in line with the registry.
    pub async fn reconcile(&self, id: ProcessId) -> Result<()> {
        self.core.reconcile(id).await
    }

    /// End time of the last successful run of a process.
    pub async fn last_success(&self, id: ProcessId) -> Result<Option<DateTime<Utc>>> {
        Ok(self.core.logger.last_process_timestamp(id).await?)
    }

    /// Copy of the admission queue.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.core.queue().snapshot()
    }

    /// Whether `id` has a live timer.
    pub fn has_timer(&self, id: ProcessId) -> bool {
        self.core.timers().contains(id)
    }

    /// Current status.
    pub fn status(&self) -> EngineStatus {
        let core = &self.core;
        let snapshot = core.queue().snapshot();
        EngineStatus {
            instance_id: core.filter.current(),
            instance_name: core.instance_name.clone(),
            service_kind: core.service_kind,
            payload_kind: core.payload.kind(),
            started_at: core.started_at,
            workers: core.worker_count,
            active: snapshot.active.len(),
            ready: snapshot.ready.len(),
            waiting: snapshot.waiting_len(),
            running: snapshot.running.len(),
            timers: core.timers().len(),
            processes: core.registry.upgrade().map_or(0, |r| r.len()),
            shutting_down: core.is_stopping(),
        }
    }

    /// Receive lifecycle events published from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ProcessEvent> {
        self.core.events.subscribe()
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.core.is_stopping()
    }

    /// Gracefully shut the engine down.
    ///
    /// Stops admitting triggers and aborts timers, then cancels every queued
    /// and waiting request. The dispatcher is stopped and in-flight executions
    /// are awaited before the registry watcher is stopped. Calling it again is
    /// a no-op.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        let Some(tasks) = tasks.take() else {
            return;
        };

        info!(instance_name = %self.core.instance_name, "ProcessEngine shutting down...");
        let core = &self.core;
        core.stopping.store(true, Ordering::SeqCst);
        core.timers().cancel_all();

        let dropped = core.queue().drain_all();
        let cancelled = dropped.len();
        if let Err(e) = core.cancel_requests(dropped).await {
            warn!(error = %e, "Failed to record cancellations during shutdown");
        }

        // The dispatcher exits without spawning more workers once it sees the flag
        core.wake.notify_one();
        if let Err(e) = tasks.dispatcher.await {
            error!(error = %e, "Dispatcher task failed");
        }

        // Every worker holds a permit until its completion has been recorded
        match core.workers.acquire_many(core.worker_permits).await {
            Ok(permits) => drop(permits),
            Err(e) => warn!(error = %e, "Worker pool closed before shutdown"),
        }

        let _ = tasks.stop_tx.send(true);
        if let Err(e) = tasks.watcher.await {
            error!(error = %e, "Registry watcher task failed");
        }

        info!(cancelled, "ProcessEngine shutdown complete");
    }
}

/// State shared by the engine handle, the dispatcher, workers, and timers.
pub(crate) struct EngineCore {
    pub(crate) registry: Weak<ProcessRegistry>,
    pub(crate) logger: Arc<dyn ExecutionLogger>,
    pub(crate) payload: Arc<dyn Payload>,
    pub(crate) filter: InstanceFilter,
    queue: Mutex<AdmissionQueue>,
    timers: Mutex<TimerSet>,
    pub(crate) events: EventBus,
    pub(crate) workers: Arc<Semaphore>,
    worker_count: usize,
    worker_permits: u32,
    /// Signalled when the ReadyQueue gains work and on shutdown.
    pub(crate) wake: Notify,
    stopping: AtomicBool,
    instance_name: String,
    service_kind: ServiceKind,
    started_at: DateTime<Utc>,
}

impl EngineCore {
    pub(crate) fn queue(&self) -> MutexGuard<'_, AdmissionQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timers(&self) -> MutexGuard<'_, TimerSet> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub(crate) fn registry(&self) -> Result<Arc<ProcessRegistry>> {
        self.registry.upgrade().ok_or(Error::RegistryUnavailable)
    }

    async fn enqueue(&self, id: ProcessId, trigger_time: DateTime<Utc>) -> Result<Admission> {
        if self.is_stopping() {
            return Err(AdmissionError::ShuttingDown.into());
        }

        let params = self
            .registry()?
            .find(id)
            .map_err(|_| AdmissionError::UnknownProcess(id))?;
        if let Err(e) = self.filter.check(&params) {
            debug!(process_id = %id, reason = %e, "Trigger dropped");
            return Err(e.into());
        }

        let registration_id = self.logger.start(id).await?;
        self.logger
            .result(ExecutionState::Queued, Utc::now(), registration_id)
            .await?;

        let request = ExecutionRequest {
            process_id: id,
            trigger_time,
            registration_id,
        };

        // A busy process gets its ON_WAIT_QUEUE row before the request enters
        // the queue, so no RUNNING or terminal row can precede it.
        let mut deferral_logged = false;
        let placement = loop {
            {
                let mut queue = self.queue();
                if self.is_stopping() {
                    break None;
                }
                if deferral_logged || !queue.is_active(id) {
                    let placement = queue.admit(request.clone());
                    self.events.emit(ProcessEvent::Admitted {
                        process_id: id,
                        registration_id,
                        deferred: placement == Placement::Deferred,
                    });
                    break Some(placement);
                }
            }

            self.logger
                .result(ExecutionState::OnWaitQueue, Utc::now(), registration_id)
                .await?;
            deferral_logged = true;
        };

        match placement {
            Some(Placement::Ready) => {
                debug!(process_id = %id, registration_id = %registration_id, "Trigger admitted");
                self.wake.notify_one();
                Ok(Admission::Ready(registration_id))
            }
            Some(Placement::Deferred) => {
                debug!(
                    process_id = %id,
                    registration_id = %registration_id,
                    "Process busy, trigger deferred"
                );
                Ok(Admission::Deferred(registration_id))
            }
            None => {
                self.cancel_requests(vec![request]).await?;
                Err(AdmissionError::ShuttingDown.into())
            }
        }
    }

    /// Re-resolve one process and make its timer and queue entries match.
    pub(crate) async fn reconcile(self: &Arc<Self>, id: ProcessId) -> Result<()> {
        let params = self.registry()?.find(id).ok();

        match params {
            Some(params) if self.filter.owns(&params) => {
                let mut timers = self.timers();
                if params.active && !self.is_stopping() {
                    timers.ensure(id, &params.schedule, self.fire_fn())?;
                } else {
                    timers.cancel(id);
                }
                Ok(())
            }
            _ => {
                self.timers().cancel(id);
                let dropped = self.queue().purge(id);
                if !dropped.is_empty() {
                    info!(
                        process_id = %id,
                        cancelled = dropped.len(),
                        "Process no longer managed here, queued triggers cancelled"
                    );
                }
                self.cancel_requests(dropped).await
            }
        }
    }

    /// Record requests that were dropped before running.
    ///
    /// Every request is attempted; the first log failure is returned.
    pub(crate) async fn cancel_requests(&self, requests: Vec<ExecutionRequest>) -> Result<()> {
        let mut first_error: Option<logger::LogError> = None;
        for request in requests {
            if let Err(e) = self
                .logger
                .result(ExecutionState::Cancelled, Utc::now(), request.registration_id)
                .await
            {
                warn!(
                    registration_id = %request.registration_id,
                    error = %e,
                    "Failed to record cancellation"
                );
                first_error.get_or_insert(e);
            }
            self.events.emit(ProcessEvent::Cancelled {
                process_id: request.process_id,
                registration_id: request.registration_id,
            });
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn fire_fn(self: &Arc<Self>) -> FireFn {
        let core = Arc::downgrade(self);
        Arc::new(move |id| {
            let Some(core) = core.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                match core.enqueue(id, Utc::now()).await {
                    Ok(_) => {}
                    Err(e) if e.is_drop() => {
                        debug!(process_id = %id, reason = %e, "Scheduled trigger dropped");
                    }
                    Err(e) => {
                        error!(process_id = %id, error = %e, "Scheduled trigger failed");
                    }
                }
            });
        })
    }
}

/// Reconcile every registry change until the registry goes away or the engine stops.
async fn watch_registry(
    core: Arc<EngineCore>,
    mut changes: tokio::sync::mpsc::UnboundedReceiver<crate::registry::RegistryEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            change = changes.recv() => {
                let Some(change) = change else {
                    debug!("Process registry dropped, watcher exiting");
                    break;
                };
                debug!(process_id = %change.process_id, kind = ?change.kind, "Registry change");
                if let Err(e) = core.reconcile(change.process_id).await {
                    warn!(process_id = %change.process_id, error = %e, "Failed to apply registry change");
                }
            }
            _ = stop.changed() => {
                debug!("Registry watcher received shutdown signal");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::InMemoryExecutionLogger;
    use crate::payload::MockPayload;

    fn builder() -> ProcessEngineBuilder {
        ProcessEngine::builder()
            .registry(Arc::new(ProcessRegistry::new()))
            .logger(Arc::new(InMemoryExecutionLogger::new()))
            .payload(Arc::new(MockPayload::new()))
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = ProcessEngine::builder().build().err().unwrap();
        assert!(err.to_string().contains("registry is required"));

        let err = ProcessEngine::builder()
            .registry(Arc::new(ProcessRegistry::new()))
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("logger is required"));
    }

    #[test]
    fn test_builder_rejects_zero_workers() {
        assert!(builder().workers(0).build().is_err());
        assert!(builder().workers(2).build().is_ok());
    }

    #[test]
    fn test_admission_accessors() {
        let ready = Admission::Ready(RegistrationId(4));
        let deferred = Admission::Deferred(RegistrationId(5));
        assert_eq!(ready.registration_id(), RegistrationId(4));
        assert!(!ready.is_deferred());
        assert!(deferred.is_deferred());
    }

    #[tokio::test]
    async fn test_request_for_removed_process_cancelled_before_start() {
        let registry = Arc::new(ProcessRegistry::new());
        let logger = Arc::new(InMemoryExecutionLogger::new());
        let payload = Arc::new(MockPayload::new());
        let engine = ProcessEngine::builder()
            .registry(registry.clone())
            .logger(logger.clone())
            .payload(payload.clone())
            .workers(1)
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();
        let mut events = engine.subscribe_events();

        // Admitted while registered; the process is gone by the time a worker runs it
        let id = ProcessId(77);
        let registration_id = logger.start(id).await.unwrap();
        logger
            .result(ExecutionState::Queued, Utc::now(), registration_id)
            .await
            .unwrap();
        engine.core.queue().admit(ExecutionRequest {
            process_id: id,
            trigger_time: Utc::now(),
            registration_id,
        });
        engine.core.wake.notify_one();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ProcessEvent::Cancelled {
                process_id: id,
                registration_id
            }
        );
        assert_eq!(
            logger.states(registration_id),
            vec![ExecutionState::Queued, ExecutionState::Cancelled]
        );
        assert_eq!(logger.times(registration_id), (None, None));
        assert!(payload.calls().is_empty());

        // The process is released right after the cancellation is recorded
        for _ in 0..500 {
            if engine.snapshot().is_idle() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(engine.snapshot().is_idle());
        assert!(events.try_recv().is_err());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_reports_identity() {
        let engine = builder()
            .instance_id(InstanceId(3))
            .instance_name("alert-1")
            .service_kind(ServiceKind::Alert)
            .workers(2)
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();

        let status = engine.status();
        assert_eq!(status.instance_id, InstanceId(3));
        assert_eq!(status.instance_name, "alert-1");
        assert_eq!(status.service_kind, ServiceKind::Alert);
        assert_eq!(status.payload_kind, "mock");
        assert_eq!(status.workers, 2);
        assert_eq!(status.active, 0);
        assert!(!status.shutting_down);

        engine.shutdown().await;
        assert!(engine.status().shutting_down);
    }
}
