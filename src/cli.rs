//! # Command Line
//!
//! Flags override the environment-derived configuration.

use clap::Parser;
use release_creation_status_controller::config::{ControllerConfig, ServerConfig};

/// Mirrors release creation Job status onto ReleasePayload resources
#[derive(Debug, Parser)]
#[command(name = "release-creation-status-controller", version, about)]
pub struct Cli {
    /// Namespace the release creation Jobs run in
    #[arg(long)]
    pub job_namespace: Option<String>,

    /// Only watch ReleasePayloads in this namespace (default: all namespaces)
    #[arg(long)]
    pub release_namespace: Option<String>,

    /// Number of parallel reconciliation workers
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// Port for the metrics and probe server
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

impl Cli {
    /// Apply flags on top of the environment configuration
    pub fn apply(self, controller: &mut ControllerConfig, server: &mut ServerConfig) {
        if let Some(job_namespace) = self.job_namespace {
            controller.job_namespace = job_namespace;
        }
        if let Some(release_namespace) = self.release_namespace {
            controller.release_namespace = Some(release_namespace);
        }
        if let Some(workers) = self.workers {
            controller.workers = usize::from(workers);
        }
        if let Some(metrics_port) = self.metrics_port {
            server.metrics_port = metrics_port;
        }
    }
}
