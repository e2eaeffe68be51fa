//! # Work Queue
//!
//! Deduplicating FIFO with delayed and rate-limited adds.
//!
//! Guarantees:
//! - an item is queued at most once, however often it is added
//! - an item is handed to at most one worker at a time; adding it while it is
//!   being processed re-queues it when the worker calls [`WorkQueue::done`]
//! - delayed adds of the same item are coalesced, the earliest one wins

use super::backoff::RateLimiter;
use crate::observability;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct State<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    /// Pending delayed adds with the token that cancels their timer
    waiting: HashMap<T, (Instant, CancellationToken)>,
    shutting_down: bool,
}

struct Inner<T> {
    name: String,
    state: Mutex<State<T>>,
    notify: Notify,
    rate_limiter: Box<dyn RateLimiter<T>>,
    shutdown: CancellationToken,
}

/// Rate-limited work queue, cheap to clone
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, rate_limiter: impl RateLimiter<T> + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                rate_limiter: Box::new(rate_limiter),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an item for processing; no-op if it is already queued
    pub fn add(&self, item: T) {
        {
            let mut state = self.state();
            if state.shutting_down || !state.dirty.insert(item.clone()) {
                return;
            }
            observability::metrics::increment_queue_adds(&self.inner.name);
            if state.processing.contains(&item) {
                return;
            }
            state.queue.push_back(item);
            observability::metrics::set_queue_depth(&self.inner.name, state.queue.len());
        }
        self.inner.notify.notify_one();
    }

    /// Queue an item once `delay` has elapsed
    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }

        let ready_at = Instant::now() + delay;
        let timer = {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            if let Some((existing, _)) = state.waiting.get(&item) {
                if *existing <= ready_at {
                    return;
                }
            }
            let timer = self.inner.shutdown.child_token();
            if let Some((_, superseded)) = state.waiting.insert(item.clone(), (ready_at, timer.clone())) {
                superseded.cancel();
            }
            timer
        };

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep_until(ready_at) => {}
                () = timer.cancelled() => return,
            }
            let due = {
                let mut state = queue.state();
                match state.waiting.get(&item) {
                    Some((at, _)) if *at == ready_at => {
                        state.waiting.remove(&item);
                        true
                    }
                    _ => false,
                }
            };
            if due {
                queue.add(item);
            }
        });
    }

    /// Queue an item after the delay chosen by the rate limiter
    ///
    /// Returns the chosen delay.
    pub fn add_rate_limited(&self, item: T) -> Duration {
        let delay = self.inner.rate_limiter.when(&item);
        self.add_after(item, delay);
        delay
    }

    /// Clear the rate limiter history of an item
    pub fn forget(&self, item: &T) {
        self.inner.rate_limiter.forget(item);
    }

    /// Rate-limited requeues of an item since it was last forgotten
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.inner.rate_limiter.num_requeues(item)
    }

    /// Wait for the next item
    ///
    /// Returns `None` once the queue is shutting down.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    observability::metrics::set_queue_depth(&self.inner.name, state.queue.len());
                    return Some(item);
                }
            }

            notified.await;
        }
    }

    /// Mark an item as processed
    ///
    /// If the item was added again while it was being processed it goes back
    /// on the queue now.
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut state = self.state();
            state.processing.remove(item);
            if state.dirty.contains(item) && !state.shutting_down {
                state.queue.push_back(item.clone());
                observability::metrics::set_queue_depth(&self.inner.name, state.queue.len());
                true
            } else {
                false
            }
        };
        if requeued {
            self.inner.notify.notify_one();
        }
    }

    /// Stop handing out items and wake every waiting worker
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Items ready for processing
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workqueue::backoff::ItemExponentialBackoff;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(
            "test",
            ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_add_deduplicates_queued_items() {
        let queue = queue();
        queue.add("ocp/a".to_string());
        queue.add("ocp/a".to_string());
        queue.add("ocp/b".to_string());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get().await.as_deref(), Some("ocp/a"));
        assert_eq!(queue.get().await.as_deref(), Some("ocp/b"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_item_added_while_processing_is_requeued_on_done() {
        let queue = queue();
        queue.add("ocp/a".to_string());
        let item = queue.get().await.unwrap();

        // Not handed out again while in flight
        queue.add("ocp/a".to_string());
        assert!(queue.is_empty());

        queue.done(&item);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await.as_deref(), Some("ocp/a"));
    }

    #[tokio::test]
    async fn test_done_without_readd_drains_item() {
        let queue = queue();
        queue.add("ocp/a".to_string());
        let item = queue.get().await.unwrap();
        queue.done(&item);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_waiting_get() {
        let queue = queue();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;

        queue.shut_down();
        assert_eq!(waiter.await.unwrap(), None);
        assert!(queue.is_shutting_down());
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_ignored() {
        let queue = queue();
        queue.shut_down();
        queue.add("ocp/a".to_string());
        assert!(queue.is_empty());
        assert_eq!(queue.get().await, None);
    }

    #[tokio::test]
    async fn test_get_wakes_on_add() {
        let queue = queue();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;

        queue.add("ocp/a".to_string());
        assert_eq!(waiter.await.unwrap().as_deref(), Some("ocp/a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_delays_item() {
        let queue = queue();
        queue.add_after("ocp/a".to_string(), Duration::from_secs(5));
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_adds_are_coalesced() {
        let queue = queue();
        queue.add_after("ocp/a".to_string(), Duration::from_secs(10));
        queue.add_after("ocp/a".to_string(), Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(queue.get().await.as_deref(), Some("ocp/a"));
        queue.done(&"ocp/a".to_string());

        // The superseded 10s timer does not add the item a second time
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timer_is_cancelled() {
        let queue = queue();
        let before = tokio::runtime::Handle::current().metrics().num_alive_tasks();
        queue.add_after("ocp/a".to_string(), Duration::from_secs(1000));
        queue.add_after("ocp/a".to_string(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.len(), 1);

        // Neither the fired timer nor the 1000s one is still sleeping
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            tokio::runtime::Handle::current().metrics().num_alive_tasks(),
            before
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_rate_limited_backs_off_exponentially() {
        let queue = queue();
        let key = "ocp/a".to_string();

        assert_eq!(queue.add_rate_limited(key.clone()), Duration::from_millis(5));
        assert_eq!(queue.add_rate_limited(key.clone()), Duration::from_millis(10));
        assert_eq!(queue.num_requeues(&key), 2);

        tokio::time::sleep(Duration::from_millis(6)).await;
        assert_eq!(queue.len(), 1);

        queue.forget(&key);
        assert_eq!(queue.num_requeues(&key), 0);
    }
}
