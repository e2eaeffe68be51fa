//! Shared fixtures for the integration tests
//!
//! Builds ReleasePayloads and Jobs, and wires a [`Reconciler`] to in-memory
//! stores so tests can inspect every write and event.

#![allow(dead_code, reason = "not every test binary uses every fixture")]

use k8s_openapi::api::batch::v1::Job;
use release_creation_status_controller::controller::events::InMemoryEventRecorder;
use release_creation_status_controller::controller::reconciler::Reconciler;
use release_creation_status_controller::store::memory::{InMemoryJobs, InMemoryReleasePayloads};
use release_creation_status_controller::{
    ReleaseCreationJobCoordinates, ReleaseCreationJobResult, ReleaseCreationJobStatus,
    ReleasePayload, ReleasePayloadSpec, ReleasePayloadStatus,
};
use serde_json::json;
use std::sync::Arc;

pub const PAYLOAD_NAMESPACE: &str = "ocp";
pub const JOB_NAMESPACE: &str = "ci-release";
pub const RELEASE: &str = "4.11.0-0.nightly-2022-02-09-091559";

pub fn key(name: &str) -> String {
    format!("{PAYLOAD_NAMESPACE}/{name}")
}

/// A payload without any status
pub fn bare_payload(name: &str) -> ReleasePayload {
    let mut payload = ReleasePayload::new(name, ReleasePayloadSpec::default());
    payload.metadata.namespace = Some(PAYLOAD_NAMESPACE.to_string());
    payload
}

/// A payload tracking the job `job_name` in the job namespace
pub fn payload(
    name: &str,
    job_name: &str,
    status: Option<ReleaseCreationJobStatus>,
    message: &str,
) -> ReleasePayload {
    let mut payload = bare_payload(name);
    payload.status = Some(ReleasePayloadStatus {
        release_creation_job_result: ReleaseCreationJobResult {
            coordinates: ReleaseCreationJobCoordinates {
                namespace: JOB_NAMESPACE.to_string(),
                name: job_name.to_string(),
            },
            status,
            message: message.to_string(),
        },
    });
    payload
}

fn job(name: &str, status: serde_json::Value) -> Job {
    serde_json::from_value(json!({
        "metadata": { "name": name, "namespace": JOB_NAMESPACE },
        "status": status,
    }))
    .unwrap()
}

pub fn completed_job(name: &str) -> Job {
    job(name, json!({ "completionTime": "2022-02-09T09:42:17Z", "succeeded": 1 }))
}

pub fn failed_job(name: &str, reason: Option<&str>, message: Option<&str>) -> Job {
    job(
        name,
        json!({
            "failed": 1,
            "conditions": [{
                "type": "Failed",
                "status": "True",
                "reason": reason,
                "message": message,
            }],
        }),
    )
}

pub fn suspended_job(name: &str) -> Job {
    job(
        name,
        json!({ "conditions": [{ "type": "Suspended", "status": "True" }] }),
    )
}

pub fn active_job(name: &str) -> Job {
    job(name, json!({ "active": 1 }))
}

/// A reconciler over in-memory stores
pub struct Harness {
    pub payloads: Arc<InMemoryReleasePayloads>,
    pub jobs: Arc<InMemoryJobs>,
    pub recorder: Arc<InMemoryEventRecorder>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        let payloads = Arc::new(InMemoryReleasePayloads::new());
        let jobs = Arc::new(InMemoryJobs::new());
        let recorder = Arc::new(InMemoryEventRecorder::new());
        let reconciler = Arc::new(Reconciler::new(
            Arc::<InMemoryReleasePayloads>::clone(&payloads),
            Arc::<InMemoryReleasePayloads>::clone(&payloads),
            Arc::<InMemoryJobs>::clone(&jobs),
            JOB_NAMESPACE,
            Arc::<InMemoryEventRecorder>::clone(&recorder),
        ));
        Self {
            payloads,
            jobs,
            recorder,
            reconciler,
        }
    }

    /// Live release creation job result of a payload in the payload namespace
    pub fn result(&self, name: &str) -> Option<ReleaseCreationJobResult> {
        self.payloads
            .live(PAYLOAD_NAMESPACE, name)
            .and_then(|p| p.status)
            .map(|s| s.release_creation_job_result)
    }
}
