//! # Events
//!
//! Best-effort Kubernetes events for release creation job transitions.
//!
//! Recording never fails the caller: errors are logged and dropped.

use crate::constants::CONTROLLER_NAME;
use crate::crd::{ReleaseCreationJobStatus, ReleasePayload};
use async_trait::async_trait;
use kube::{Client, Resource};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Event describing a new release creation job result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub kind: EventKind,
    pub reason: &'static str,
    pub message: String,
}

impl StatusEvent {
    /// Event for a result that was just written
    pub fn for_transition(status: ReleaseCreationJobStatus, message: &str) -> Self {
        let (kind, reason) = match status {
            ReleaseCreationJobStatus::Success => (EventKind::Normal, "ReleaseCreationJobSucceeded"),
            ReleaseCreationJobStatus::Failed => (EventKind::Warning, "ReleaseCreationJobFailed"),
            ReleaseCreationJobStatus::Unknown => (EventKind::Normal, "ReleaseCreationJobUnknown"),
        };
        Self {
            kind,
            reason,
            message: message.to_string(),
        }
    }
}

/// Outbound event sink
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, payload: &ReleasePayload, event: StatusEvent);
}

/// Publishes events through the Kubernetes events API
#[derive(Clone)]
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl fmt::Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventRecorder").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    /// Publishes on a background task so a slow events API never holds up a
    /// worker
    async fn record(&self, payload: &ReleasePayload, event: StatusEvent) {
        let type_ = match event.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };
        let reference = payload.object_ref(&());
        let key = payload.key();
        let recorder = self.recorder.clone();
        tokio::spawn(async move {
            if let Err(e) = recorder
                .publish(
                    &Event {
                        type_,
                        reason: event.reason.to_string(),
                        note: Some(event.message),
                        action: "UpdateReleaseCreationJobResult".to_string(),
                        secondary: None,
                    },
                    &reference,
                )
                .await
            {
                warn!(
                    "Failed to record event {} for ReleasePayload {}: {}",
                    event.reason, key, e
                );
            }
        });
    }
}

/// Keeps events in memory; used by tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryEventRecorder {
    events: Mutex<Vec<(String, StatusEvent)>>,
}

impl InMemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events with the key of the payload they were recorded against
    pub fn events(&self) -> Vec<(String, StatusEvent)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventRecorder for InMemoryEventRecorder {
    async fn record(&self, payload: &ReleasePayload, event: StatusEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((payload.key(), event));
    }
}
