//! # Job Status Mapping
//!
//! Maps an observed batch Job onto the release creation job result.
//!
//! The Job is first classified into a [`JobObservation`] so that precedence is
//! explicit and independent of the order of `status.conditions`:
//!
//! 1. completion time set            -> Success
//! 2. `Failed` condition with `True` -> Failed
//! 3. `Suspended` condition          -> Unknown
//! 4. active or ready pods           -> Unknown (pending)
//! 5. anything else, or no Job       -> Unknown

use crate::crd::ReleaseCreationJobStatus;
use k8s_openapi::api::batch::v1::Job;

pub const RELEASE_CREATION_JOB_SUCCESS_MESSAGE: &str = "Release creation job completed successfully";
pub const RELEASE_CREATION_JOB_FAILURE_MESSAGE: &str = "Release creation job failed";
pub const RELEASE_CREATION_JOB_UNKNOWN_MESSAGE: &str =
    "Unable to determine release creation job status";
pub const RELEASE_CREATION_JOB_PENDING_MESSAGE: &str = "Release creation job is pending";

const JOB_CONDITION_FAILED: &str = "Failed";
const JOB_CONDITION_SUSPENDED: &str = "Suspended";
const CONDITION_TRUE: &str = "True";

/// What the controller can tell about a Job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobObservation<'a> {
    /// No Job with the expected name exists
    NotFound,
    /// Completion time is set
    Completed,
    /// A `Failed` condition is `True`
    Failed {
        reason: Option<&'a str>,
        message: Option<&'a str>,
    },
    /// A `Suspended` condition is present
    Suspended,
    /// Pods are active or ready
    Running,
    /// Nothing conclusive yet
    Indeterminate,
}

impl<'a> JobObservation<'a> {
    /// Classify a Job; `None` means the Job was not found
    pub fn observe(job: Option<&'a Job>) -> Self {
        let Some(status) = job.and_then(|j| j.status.as_ref()) else {
            return match job {
                Some(_) => JobObservation::Indeterminate,
                None => JobObservation::NotFound,
            };
        };

        if status.completion_time.is_some() {
            return JobObservation::Completed;
        }

        let conditions = status.conditions.as_deref().unwrap_or_default();

        if let Some(failed) = conditions
            .iter()
            .find(|c| c.type_ == JOB_CONDITION_FAILED && c.status == CONDITION_TRUE)
        {
            return JobObservation::Failed {
                reason: failed.reason.as_deref(),
                message: failed.message.as_deref(),
            };
        }

        if conditions.iter().any(|c| c.type_ == JOB_CONDITION_SUSPENDED) {
            return JobObservation::Suspended;
        }

        if status.active.unwrap_or(0) > 0 || status.ready.unwrap_or(0) > 0 {
            return JobObservation::Running;
        }

        JobObservation::Indeterminate
    }

    pub fn status(&self) -> ReleaseCreationJobStatus {
        match self {
            JobObservation::Completed => ReleaseCreationJobStatus::Success,
            JobObservation::Failed { .. } => ReleaseCreationJobStatus::Failed,
            JobObservation::NotFound
            | JobObservation::Suspended
            | JobObservation::Running
            | JobObservation::Indeterminate => ReleaseCreationJobStatus::Unknown,
        }
    }

    pub fn message(&self) -> String {
        match self {
            JobObservation::Completed => RELEASE_CREATION_JOB_SUCCESS_MESSAGE.to_string(),
            JobObservation::Failed {
                reason: Some(reason),
                message: Some(message),
            } if !reason.is_empty() && !message.is_empty() => format!("{reason}: {message}"),
            JobObservation::Failed { .. } => RELEASE_CREATION_JOB_FAILURE_MESSAGE.to_string(),
            JobObservation::Running => RELEASE_CREATION_JOB_PENDING_MESSAGE.to_string(),
            JobObservation::NotFound
            | JobObservation::Suspended
            | JobObservation::Indeterminate => RELEASE_CREATION_JOB_UNKNOWN_MESSAGE.to_string(),
        }
    }
}

/// Outcome status for a Job (`None` = not found)
pub fn compute_release_creation_job_status(job: Option<&Job>) -> ReleaseCreationJobStatus {
    JobObservation::observe(job).status()
}

/// Outcome message for a Job (`None` = not found)
pub fn compute_release_creation_job_message(job: Option<&Job>) -> String {
    JobObservation::observe(job).message()
}
