//! # Release Creation Status Controller
//!
//! Mirrors the state of each release creation Job onto the
//! `status.releaseCreationJobResult` of the ReleasePayload that owns it.
//!
//! ## Overview
//!
//! 1. **Watching ReleasePayloads** - every add, update or delete queues the payload
//! 2. **Watching Jobs** - a Job change queues every payload whose coordinates name it
//! 3. **Reconciling** - workers map the Job onto `Success`, `Failed` or `Unknown`
//!    and write the result only when it changed
//!
//! Configuration comes from environment variables, overridden by flags.
//! Prometheus metrics and probes are served on `METRICS_PORT`.

use anyhow::Result;
use clap::Parser;
use release_creation_status_controller::config::load_config;
use release_creation_status_controller::runtime::{initialize, run};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut controller_config, mut server_config) = load_config();
    cli.apply(&mut controller_config, &mut server_config);

    let init_result = initialize(controller_config, server_config).await?;
    run(init_result).await
}
