//! # Custom Resource Definitions
//!
//! CRD types for the Release Creation Status Controller.
//!
//! Only the fields the controller reads or writes are modelled. The
//! `ReleasePayload` status carries the release creation job result this
//! controller converges.

mod status;

pub use status::*;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// ReleasePayload Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: release.openshift.io/v1alpha1
/// kind: ReleasePayload
/// metadata:
///   name: 4.11.0-0.nightly-2022-02-09-091559
///   namespace: ocp
/// spec:
///   payloadCoordinates:
///     namespace: ocp
///     imagestreamName: release
///     imagestreamTagName: 4.11.0-0.nightly-2022-02-09-091559
/// status:
///   releaseCreationJobResult:
///     coordinates:
///       name: 4.11.0-0.nightly-2022-02-09-091559
///       namespace: ci-release
///     status: Success
///     message: Release creation job completed successfully
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ReleasePayload",
    group = "release.openshift.io",
    version = "v1alpha1",
    namespaced,
    status = "ReleasePayloadStatus",
    shortname = "rp",
    printcolumn = r#"{"name":"Job", "type":"string", "jsonPath":".status.releaseCreationJobResult.coordinates.name"}, {"name":"Status", "type":"string", "jsonPath":".status.releaseCreationJobResult.status"}, {"name":"Message", "type":"string", "jsonPath":".status.releaseCreationJobResult.message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePayloadSpec {
    /// Where the release image lives; informational for this controller
    #[serde(default)]
    pub payload_coordinates: PayloadCoordinates,
}

/// Location of the release image stream tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayloadCoordinates {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub imagestream_name: String,
    #[serde(default)]
    pub imagestream_tag_name: String,
}

impl ReleasePayload {
    /// Release creation job result, if a status has been written at all
    pub fn job_result(&self) -> Option<&ReleaseCreationJobResult> {
        self.status.as_ref().map(|s| &s.release_creation_job_result)
    }

    /// Job coordinates recorded on the status; empty when unset
    pub fn job_coordinates(&self) -> ReleaseCreationJobCoordinates {
        self.job_result()
            .map(|r| r.coordinates.clone())
            .unwrap_or_default()
    }

    /// `namespace/name` key used by the work queue
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}
