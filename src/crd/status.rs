//! # ReleasePayload Status
//!
//! Status types for the release creation job result.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the ReleasePayload resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePayloadStatus {
    /// Outcome of the batch Job that creates the release
    #[serde(default)]
    pub release_creation_job_result: ReleaseCreationJobResult,
}

/// Result of the release creation Job as last observed by the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseCreationJobResult {
    /// Job the result refers to; assigned by whoever launched the Job
    #[serde(default)]
    pub coordinates: ReleaseCreationJobCoordinates,
    /// Outcome; absent until the first reconciliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReleaseCreationJobStatus>,
    /// Human-readable explanation of `status`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Namespace and name of the release creation Job
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseCreationJobCoordinates {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

impl ReleaseCreationJobCoordinates {
    /// True when neither namespace nor name has been assigned
    pub fn is_empty(&self) -> bool {
        self.namespace.is_empty() && self.name.is_empty()
    }
}

/// Converged outcome of a release creation Job
/// Values: Unknown, Success, Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ReleaseCreationJobStatus {
    Unknown,
    Success,
    Failed,
}

impl ReleaseCreationJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseCreationJobStatus::Unknown => "Unknown",
            ReleaseCreationJobStatus::Success => "Success",
            ReleaseCreationJobStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for ReleaseCreationJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
