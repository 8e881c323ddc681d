// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process lifecycle events.
//!
//! Published on a broadcast channel for status displays and tests. Publishing
//! never waits: with no receiver attached the event is simply dropped, and a
//! slow receiver lags instead of holding up the engine.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{ProcessId, RegistrationId};

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A lifecycle transition of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// A trigger was accepted.
    Admitted {
        /// Process triggered.
        process_id: ProcessId,
        /// Execution correlation id.
        registration_id: RegistrationId,
        /// True if the request went to the process's WaitQueue.
        deferred: bool,
    },
    /// A worker picked the execution up.
    Started {
        /// Process executed.
        process_id: ProcessId,
        /// Execution correlation id.
        registration_id: RegistrationId,
    },
    /// The payload returned.
    Finished {
        /// Process executed.
        process_id: ProcessId,
        /// Execution correlation id.
        registration_id: RegistrationId,
        /// Whether the payload succeeded.
        success: bool,
    },
    /// A queued or waiting request was dropped without running.
    Cancelled {
        /// Process whose request was dropped.
        process_id: ProcessId,
        /// Execution correlation id.
        registration_id: RegistrationId,
    },
}

impl ProcessEvent {
    /// Process the event refers to.
    pub fn process_id(&self) -> ProcessId {
        match self {
            Self::Admitted { process_id, .. }
            | Self::Started { process_id, .. }
            | Self::Finished { process_id, .. }
            | Self::Cancelled { process_id, .. } => *process_id,
        }
    }

    /// Execution the event refers to.
    pub fn registration_id(&self) -> RegistrationId {
        match self {
            Self::Admitted {
                registration_id, ..
            }
            | Self::Started {
                registration_id, ..
            }
            | Self::Finished {
                registration_id, ..
            }
            | Self::Cancelled {
                registration_id, ..
            } => *registration_id,
        }
    }
}

/// Fire-and-forget publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProcessEvent>,
}

impl EventBus {
    /// Create a bus holding at most `capacity` unread events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Dropped if nobody is listening.
    pub fn emit(&self, event: ProcessEvent) {
        let _ = self.tx.send(event);
    }

    /// Receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_listener_does_not_fail() {
        let bus = EventBus::new(4);
        bus.emit(ProcessEvent::Started {
            process_id: ProcessId(1),
            registration_id: RegistrationId(1),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(ProcessEvent::Admitted {
            process_id: ProcessId(7),
            registration_id: RegistrationId(3),
            deferred: true,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.process_id(), ProcessId(7));
        assert_eq!(event.registration_id(), RegistrationId(3));
        assert!(matches!(event, ProcessEvent::Admitted { deferred: true, .. }));
    }

    #[test]
    fn test_event_json_shape() {
        let event = ProcessEvent::Finished {
            process_id: ProcessId(5),
            registration_id: RegistrationId(9),
            success: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "finished");
        assert_eq!(json["process_id"], 5);
        assert_eq!(json["success"], false);
    }
}
