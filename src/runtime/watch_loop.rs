//! # Watch Loop
//!
//! Keeps the ReleasePayload and Job caches current and turns watch events into
//! work items.
//!
//! - ReleasePayload events enqueue the payload itself.
//! - Job events enqueue every cached payload whose coordinates name the Job.
//!   The mapping is a scan over the payload cache; there are few enough
//!   payloads that an index is not worth keeping.
//!
//! Watch errors are logged and the stream reconnects with backoff.

use crate::config::ControllerConfig;
use crate::crd::ReleasePayload;
use crate::runtime::scheduler::CacheSync;
use crate::store::kubernetes::{ReflectorJobLister, ReflectorReleasePayloadLister};
use crate::store::{payload_keys_for_job, ReleasePayloadLister};
use crate::workqueue::WorkQueue;
use futures::{Stream, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use kube::{Api, Client};
use kube_runtime::reflector::{self, Store};
use kube_runtime::{watcher, WatchStreamExt};
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Enqueue a payload that was added, changed or deleted
pub fn enqueue_payload(queue: &WorkQueue<String>, payload: &ReleasePayload) {
    queue.add(payload.key());
}

/// Enqueue every payload that tracks `job`
pub fn enqueue_payloads_for_job(
    queue: &WorkQueue<String>,
    payloads: &dyn ReleasePayloadLister,
    job: &Job,
) {
    let Some(job_name) = job.metadata.name.as_deref() else {
        return;
    };
    for key in payload_keys_for_job(payloads, job_name) {
        debug!("Job {} changed, enqueueing ReleasePayload {}", job_name, key);
        queue.add(key);
    }
}

/// Drive a watch stream until it ends or `shutdown` is cancelled
///
/// `on_object` sees every applied or deleted object, including the initial list.
pub async fn run_watch<K, S, F>(
    kind: &'static str,
    events: S,
    shutdown: CancellationToken,
    mut on_object: F,
) where
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
    F: FnMut(&K),
{
    let mut events = pin!(events);
    info!("Starting {} watch", kind);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!("{} watch shutting down", kind);
                break;
            }
            event = events.next() => {
                match event {
                    Some(Ok(
                        watcher::Event::Apply(object)
                        | watcher::Event::InitApply(object)
                        | watcher::Event::Delete(object),
                    )) => on_object(&object),
                    Some(Ok(watcher::Event::Init)) => debug!("{} watch (re)listing", kind),
                    Some(Ok(watcher::Event::InitDone)) => debug!("{} watch list complete", kind),
                    Some(Err(e)) => warn!("Error watching {}, will retry: {}", kind, e),
                    None => {
                        warn!("{} watch stream ended", kind);
                        break;
                    }
                }
            }
        }
    }
}

/// Running watches and the caches they populate
pub struct Informers {
    pub payloads: Store<ReleasePayload>,
    pub jobs: Store<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl Informers {
    /// One sync future per cache, for [`crate::runtime::Scheduler::run`]
    pub fn cache_syncs(&self) -> Vec<CacheSync> {
        let payloads = self.payloads.clone();
        let jobs = self.jobs.clone();
        vec![
            CacheSync::new("ReleasePayload", async move {
                payloads.wait_until_ready().await
            }),
            CacheSync::new("Job", async move { jobs.wait_until_ready().await }),
        ]
    }

    pub fn payload_lister(&self) -> Arc<ReflectorReleasePayloadLister> {
        Arc::new(ReflectorReleasePayloadLister::new(self.payloads.clone()))
    }

    pub fn job_lister(&self) -> Arc<ReflectorJobLister> {
        Arc::new(ReflectorJobLister::new(self.jobs.clone()))
    }

    /// Wait for the watch tasks to exit after shutdown
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Watch task failed: {}", e);
            }
        }
    }
}

impl fmt::Debug for Informers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Informers")
            .field("payloads", &self.payloads.len())
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

/// Start the ReleasePayload and Job watches
///
/// ReleasePayloads are watched in `release_namespace`, or cluster-wide when it
/// is unset. Jobs are only watched in `job_namespace`.
pub fn start_informers(
    client: &Client,
    config: &ControllerConfig,
    queue: &WorkQueue<String>,
    shutdown: &CancellationToken,
) -> Informers {
    let payload_api: Api<ReleasePayload> = match &config.release_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    let job_api: Api<Job> = Api::namespaced(client.clone(), &config.job_namespace);

    let (payload_store, payload_writer) = reflector::store();
    let (job_store, job_writer) = reflector::store();

    let payload_events = watcher(payload_api, watcher::Config::default())
        .default_backoff()
        .reflect(payload_writer);
    let job_events = watcher(job_api, watcher::Config::default())
        .default_backoff()
        .reflect(job_writer);

    let payload_handle = {
        let queue = queue.clone();
        tokio::spawn(run_watch(
            "ReleasePayload",
            payload_events,
            shutdown.clone(),
            move |payload: &ReleasePayload| enqueue_payload(&queue, payload),
        ))
    };

    let job_handle = {
        let queue = queue.clone();
        let payloads = ReflectorReleasePayloadLister::new(payload_store.clone());
        tokio::spawn(run_watch(
            "Job",
            job_events,
            shutdown.clone(),
            move |job: &Job| enqueue_payloads_for_job(&queue, &payloads, job),
        ))
    };

    Informers {
        payloads: payload_store,
        jobs: job_store,
        handles: vec![payload_handle, job_handle],
    }
}
