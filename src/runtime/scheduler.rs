//! # Scheduler
//!
//! Drives the reconciler from the work queue.
//!
//! The scheduler waits for every cache to sync, marks the controller ready and
//! then runs a fixed pool of workers. Each worker takes one key at a time, so a
//! key is never reconciled by two workers concurrently. Cancelling the shutdown
//! token stops handing out keys; workers finish the key they hold and exit.

use crate::controller::reconciler::{Reconcile, ReconcilerError};
use crate::controller::server::ServerState;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::workqueue::WorkQueue;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Fatal runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A cache could not complete its initial list
    #[error("cache {cache} failed to sync: {reason}")]
    CacheSyncFailed { cache: &'static str, reason: String },
    /// Shutdown was requested before all caches synced
    #[error("shutdown requested before caches synced")]
    ShutdownBeforeSync,
}

/// A named future that resolves once a cache holds its initial state
pub struct CacheSync {
    name: &'static str,
    ready: BoxFuture<'static, Result<(), String>>,
}

impl CacheSync {
    pub fn new<F, E>(name: &'static str, ready: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display,
    {
        Self {
            name,
            ready: ready.map(|r| r.map_err(|e| e.to_string())).boxed(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for CacheSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSync")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Wait for every cache or the shutdown token, whichever comes first
pub async fn wait_for_cache_sync(
    caches: Vec<CacheSync>,
    shutdown: &CancellationToken,
) -> Result<(), RuntimeError> {
    let names: Vec<&str> = caches.iter().map(CacheSync::name).collect();
    info!("Waiting for caches to sync: {}", names.join(", "));

    let all_synced = futures::future::try_join_all(caches.into_iter().map(
        |CacheSync { name, ready }| async move {
            ready.await.map_err(|reason| RuntimeError::CacheSyncFailed {
                cache: name,
                reason,
            })?;
            debug!("Cache {} synced", name);
            Ok::<_, RuntimeError>(())
        },
    ));

    tokio::select! {
        result = all_synced => {
            result?;
            info!("Caches synced");
            Ok(())
        }
        () = shutdown.cancelled() => Err(RuntimeError::ShutdownBeforeSync),
    }
}

/// Take one key off the queue and reconcile it
///
/// A panic in the reconciler is handled like a retryable error, so the key is
/// released and the worker keeps running. Returns `false` once the queue is
/// shutting down.
pub async fn process_next_work_item(queue: &WorkQueue<String>, reconciler: &dyn Reconcile) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    let result = AssertUnwindSafe(reconciler.reconcile(&key))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(ReconcilerError::Panicked {
                key: key.clone(),
                message: panic_message(panic.as_ref()),
            })
        });

    match result {
        Ok(()) => queue.forget(&key),
        Err(e) => {
            handle_reconciliation_error(&key, &e, queue);
        }
    }
    queue.done(&key);
    true
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_worker(id: usize, queue: WorkQueue<String>, reconciler: Arc<dyn Reconcile>) {
    debug!("Worker {} started", id);
    while process_next_work_item(&queue, reconciler.as_ref()).await {}
    debug!("Worker {} stopped", id);
}

/// Worker pool over a shared queue
pub struct Scheduler {
    queue: WorkQueue<String>,
    reconciler: Arc<dyn Reconcile>,
    workers: usize,
    server_state: Option<Arc<ServerState>>,
}

impl Scheduler {
    pub fn new(queue: WorkQueue<String>, reconciler: Arc<dyn Reconcile>, workers: usize) -> Self {
        Self {
            queue,
            reconciler,
            workers: workers.max(1),
            server_state: None,
        }
    }

    /// Flip readiness on `state` once the caches have synced
    #[must_use]
    pub fn with_server_state(mut self, state: Arc<ServerState>) -> Self {
        self.server_state = Some(state);
        self
    }

    pub fn queue(&self) -> &WorkQueue<String> {
        &self.queue
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Fails without starting any worker when a cache does not sync.
    pub async fn run(
        self,
        caches: Vec<CacheSync>,
        shutdown: CancellationToken,
    ) -> Result<(), RuntimeError> {
        let shutdown_watch = {
            let queue = self.queue.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                info!("Shutdown requested, draining workers");
                queue.shut_down();
            })
        };

        if let Err(e) = wait_for_cache_sync(caches, &shutdown).await {
            error!("{}", e);
            self.queue.shut_down();
            shutdown_watch.abort();
            return Err(e);
        }

        if let Some(state) = &self.server_state {
            state.mark_ready();
        }

        info!("Starting {} workers", self.workers);
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(run_worker(
                id,
                self.queue.clone(),
                Arc::clone(&self.reconciler),
            ));
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }

        shutdown_watch.abort();
        info!("All workers stopped");
        Ok(())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue", &self.queue)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workqueue::ItemExponentialBackoff;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
        fail_first: Mutex<usize>,
        panic_first: Mutex<usize>,
        delay: Option<Duration>,
        finished: AtomicUsize,
    }

    fn take_one(counter: &Mutex<usize>) -> bool {
        let mut remaining = counter.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return true;
        }
        false
    }

    #[async_trait]
    impl Reconcile for Recording {
        async fn reconcile(&self, key: &str) -> Result<(), ReconcilerError> {
            self.seen.lock().unwrap().push(key.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if take_one(&self.panic_first) {
                panic!("reconciler bug on {key}");
            }
            if take_one(&self.fail_first) {
                return Err(ReconcilerError::Conflict {
                    key: key.to_string(),
                });
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(
            "scheduler-test",
            ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_forgets_key() {
        let queue = queue();
        let reconciler = Recording::default();
        queue.add_rate_limited("ocp/a".to_string());
        queue.add("ocp/a".to_string());

        assert!(process_next_work_item(&queue, &reconciler).await);
        assert_eq!(queue.num_requeues(&"ocp/a".to_string()), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_requeues_key() {
        let queue = queue();
        let reconciler = Recording {
            fail_first: Mutex::new(1),
            ..Recording::default()
        };
        queue.add("ocp/a".to_string());

        assert!(process_next_work_item(&queue, &reconciler).await);
        assert_eq!(queue.num_requeues(&"ocp/a".to_string()), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(process_next_work_item(&queue, &reconciler).await);
        assert_eq!(queue.num_requeues(&"ocp/a".to_string()), 0);
        assert_eq!(reconciler.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_process_returns_false_after_shutdown() {
        let queue = queue();
        queue.shut_down();
        assert!(!process_next_work_item(&queue, &Recording::default()).await);
    }

    #[tokio::test]
    async fn test_cache_sync_failure_is_fatal() {
        let caches = vec![
            CacheSync::new("jobs", async { Ok::<_, String>(()) }),
            CacheSync::new("payloads", async { Err::<(), _>("writer dropped") }),
        ];
        let err = wait_for_cache_sync(caches, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::CacheSyncFailed {
                cache: "payloads",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_before_sync() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let caches = vec![CacheSync::new(
            "payloads",
            futures::future::pending::<Result<(), String>>(),
        )];
        let err = wait_for_cache_sync(caches, &shutdown).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ShutdownBeforeSync));
    }

    #[tokio::test]
    async fn test_run_marks_ready_and_stops_on_shutdown() {
        let queue = queue();
        let reconciler = Arc::new(Recording::default());
        let state = Arc::new(ServerState::default());
        let shutdown = CancellationToken::new();

        queue.add("ocp/a".to_string());
        queue.add("ocp/b".to_string());

        let shared = Arc::clone(&reconciler);
        let scheduler = Scheduler::new(queue.clone(), shared, 2)
            .with_server_state(Arc::clone(&state));
        let caches = vec![CacheSync::new("payloads", async { Ok::<_, String>(()) })];
        let handle = tokio::spawn(scheduler.run(caches, shutdown.clone()));

        while reconciler.seen.lock().unwrap().len() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(state.ready());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert!(queue.is_shutting_down());

        let mut seen = reconciler.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["ocp/a".to_string(), "ocp/b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_releases_key_for_retry() {
        let queue = queue();
        let reconciler = Recording {
            panic_first: Mutex::new(1),
            ..Recording::default()
        };
        queue.add("ocp/a".to_string());

        assert!(process_next_work_item(&queue, &reconciler).await);
        assert_eq!(queue.num_requeues(&"ocp/a".to_string()), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.len(), 1);
        assert!(process_next_work_item(&queue, &reconciler).await);
        assert_eq!(reconciler.finished.load(Ordering::SeqCst), 1);
        assert_eq!(queue.num_requeues(&"ocp/a".to_string()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_survives_panicking_reconcile() {
        let queue = queue();
        let reconciler = Arc::new(Recording {
            panic_first: Mutex::new(1),
            ..Recording::default()
        });
        let shutdown = CancellationToken::new();

        let shared = Arc::clone(&reconciler);
        let scheduler = Scheduler::new(queue.clone(), shared, 1);
        let caches = vec![CacheSync::new("payloads", async { Ok::<_, String>(()) })];
        let handle = tokio::spawn(scheduler.run(caches, shutdown.clone()));

        queue.add("ocp/a".to_string());
        queue.add("ocp/a".to_string());
        queue.add("ocp/b".to_string());

        while reconciler.finished.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut seen = reconciler.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["ocp/a", "ocp/a", "ocp/b"]);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_reconcile_finishes_before_run_returns() {
        let queue = queue();
        let reconciler = Arc::new(Recording {
            delay: Some(Duration::from_secs(2)),
            ..Recording::default()
        });
        let shutdown = CancellationToken::new();

        queue.add("ocp/a".to_string());
        let shared = Arc::clone(&reconciler);
        let scheduler = Scheduler::new(queue.clone(), shared, 1);
        let caches = vec![CacheSync::new("payloads", async { Ok::<_, String>(()) })];
        let handle = tokio::spawn(scheduler.run(caches, shutdown.clone()));

        while reconciler.seen.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(reconciler.finished.load(Ordering::SeqCst), 0);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(reconciler.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_wait_for_cache_sync() {
        let queue = queue();
        let reconciler = Arc::new(Recording::default());
        let state = Arc::new(ServerState::default());
        let shutdown = CancellationToken::new();
        let (synced, sync_signal) = oneshot::channel::<()>();

        queue.add("ocp/a".to_string());
        let shared = Arc::clone(&reconciler);
        let scheduler = Scheduler::new(queue.clone(), shared, 2)
            .with_server_state(Arc::clone(&state));
        let caches = vec![CacheSync::new("payloads", sync_signal)];
        let handle = tokio::spawn(scheduler.run(caches, shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(reconciler.seen.lock().unwrap().is_empty());
        assert!(!state.ready());
        assert_eq!(queue.len(), 1);

        synced.send(()).unwrap();
        while reconciler.finished.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        assert!(state.ready());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
