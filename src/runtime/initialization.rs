//! # Initialization
//!
//! Controller startup: rustls, tracing, metrics, the probe server, the
//! Kubernetes client, the watches and the worker pool.

use crate::config::{ControllerConfig, ServerConfig};
use crate::constants::CONTROLLER_NAME;
use crate::controller::events::KubeEventRecorder;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use crate::runtime::scheduler::Scheduler;
use crate::runtime::watch_loop::{start_informers, Informers};
use crate::store::kubernetes::KubeReleasePayloadClient;
use crate::workqueue::{default_controller_rate_limiter, WorkQueue};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything [`run`] needs
#[derive(Debug)]
pub struct InitializationResult {
    pub scheduler: Scheduler,
    pub informers: Informers,
    pub server_state: Arc<ServerState>,
    /// Cancelling this stops the watches, the workers and the HTTP server
    pub shutdown: CancellationToken,
    server_handle: JoinHandle<()>,
}

/// Initialize the controller runtime
///
/// Nothing is reconciled yet; [`run`] waits for the caches before starting
/// workers.
pub async fn initialize(
    controller_config: ControllerConfig,
    server_config: ServerConfig,
) -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    observability::logging::init_tracing();

    info!(
        "Starting {} v{}",
        CONTROLLER_NAME,
        env!("CARGO_PKG_VERSION")
    );
    info!(
        "Job namespace: {}, ReleasePayload namespace: {}, workers: {}",
        controller_config.job_namespace,
        controller_config
            .release_namespace
            .as_deref()
            .unwrap_or("<all>"),
        controller_config.workers
    );

    observability::metrics::register_metrics()?;

    let shutdown = CancellationToken::new();
    let server_state = Arc::new(ServerState::default());

    let server_handle = {
        let state = Arc::clone(&server_state);
        let shutdown = shutdown.clone();
        let port = server_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state, shutdown).await {
                error!("HTTP server error: {:#}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let queue = WorkQueue::new(
        CONTROLLER_NAME,
        default_controller_rate_limiter(
            controller_config.backoff_base(),
            controller_config.backoff_max(),
            controller_config.queue_qps,
            controller_config.queue_burst,
        ),
    );

    let informers = start_informers(&client, &controller_config, &queue, &shutdown);

    let reconciler = Arc::new(Reconciler::new(
        informers.payload_lister(),
        Arc::new(KubeReleasePayloadClient::new(client.clone())),
        informers.job_lister(),
        controller_config.job_namespace.clone(),
        Arc::new(KubeEventRecorder::new(client)),
    ));

    let scheduler = Scheduler::new(queue, reconciler, controller_config.workers)
        .with_server_state(Arc::clone(&server_state));

    info!("Controller initialized");

    Ok(InitializationResult {
        scheduler,
        informers,
        server_state,
        shutdown,
        server_handle,
    })
}

/// Wait for the HTTP server to bind its listener
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let start_time = tokio::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.listening() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Run until SIGINT/SIGTERM, then drain and stop
pub async fn run(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        scheduler,
        informers,
        server_state: _,
        shutdown,
        server_handle,
    } = init;

    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let caches = informers.cache_syncs();
    let result = scheduler.run(caches, shutdown.clone()).await;

    // Stop the watches and the server even when the workers never started
    shutdown.cancel();
    informers.join().await;
    if let Err(e) = server_handle.await {
        warn!("HTTP server task failed: {}", e);
    }

    result.context("Controller stopped with an error")?;
    info!("Controller stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!("Failed to listen for SIGINT: {}", e);
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for SIGINT: {}", e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
        }
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_server_ready_times_out() {
        let state = ServerState::default();
        let handle = tokio::spawn(futures::future::pending::<()>());
        let config = ServerConfig {
            metrics_port: 0,
            startup_timeout_secs: 1,
            poll_interval_ms: 50,
        };

        let err = wait_for_server_ready(&state, &handle, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("within 1 seconds"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_sees_listener() {
        let state = ServerState::default();
        state.is_listening.store(true, Ordering::Relaxed);
        let handle = tokio::spawn(futures::future::pending::<()>());

        wait_for_server_ready(&state, &handle, &ServerConfig::default())
            .await
            .unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_fails_when_server_exits() {
        let state = ServerState::default();
        let handle = tokio::spawn(async {});
        tokio::task::yield_now().await;
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }

        assert!(wait_for_server_ready(&state, &handle, &ServerConfig::default())
            .await
            .is_err());
    }
}
