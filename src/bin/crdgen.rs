//! Print the ReleasePayload CustomResourceDefinition as YAML
//!
//! Usage:
//!   cargo run --bin crdgen > config/crd/releasepayload.yaml

use anyhow::{Context, Result};
use kube::CustomResourceExt;
use release_creation_status_controller::ReleasePayload;

fn main() -> Result<()> {
    let crd = serde_yaml::to_string(&ReleasePayload::crd())
        .context("Failed to serialize ReleasePayload CRD")?;
    print!("{crd}");
    Ok(())
}
