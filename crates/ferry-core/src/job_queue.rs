use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::job::Job;

/// Shared FIFO of jobs consumed by the worker pool.
///
/// Implementations must never hand the same job to two callers of
/// [`dequeue`](JobQueue::dequeue), and must count a dequeued job as in flight
/// until [`mark_done`](JobQueue::mark_done) is called for it.
pub trait JobQueue: Send + Sync + Clone + 'static {
    fn enqueue(&self, job: Job);

    /// Take the next job, or `None` when the queue is empty.
    fn dequeue(&self) -> Option<Job>;

    /// Signal that one previously dequeued job has finished, successfully or not.
    fn mark_done(&self);

    /// Resolves once the queue is empty and every dequeued job has been marked done.
    fn wait_until_drained(&self) -> impl Future<Output = ()> + Send;

    /// Jobs not yet dequeued.
    fn pending(&self) -> usize;

    /// Jobs dequeued but not yet marked done.
    fn in_flight(&self) -> usize;
}

/// In-process [`JobQueue`] backed by a mutex-guarded `VecDeque`.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    jobs: Mutex<VecDeque<Job>>,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    drained: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let queue = Self::new();
        for job in jobs {
            queue.enqueue(job);
        }
        queue
    }

    /// Number of `mark_done` calls that matched a dequeued job.
    pub fn completed(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }

    fn jobs(&self) -> MutexGuard<'_, VecDeque<Job>> {
        // A worker that panicked while holding the lock cannot have left the
        // deque half-modified, so poisoning is safe to ignore.
        self.inner
            .jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_drained(&self) -> bool {
        let jobs = self.jobs();
        jobs.is_empty() && self.inner.in_flight.load(Ordering::SeqCst) == 0
    }
}

impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, job: Job) {
        self.jobs().push_back(job);
    }

    fn dequeue(&self) -> Option<Job> {
        let mut jobs = self.jobs();
        let job = jobs.pop_front()?;
        // Counted while the lock is held so `is_drained` never sees a gap.
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(job)
    }

    fn mark_done(&self) {
        let previous = self
            .inner
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match previous {
            Ok(_) => {
                self.inner.completed.fetch_add(1, Ordering::SeqCst);
                if self.is_drained() {
                    self.inner.drained.notify_waiters();
                }
            }
            Err(_) => {
                tracing::warn!("mark_done called with no job in flight; ignoring");
            }
        }
    }

    async fn wait_until_drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a notification between the check
            // and the await is not lost.
            notified.as_mut().enable();
            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }

    fn pending(&self) -> usize {
        self.jobs().len()
    }

    fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

/// Marks its job done when dropped.
///
/// Held for the whole of a worker iteration so that every exit path,
/// including `?` and panics, releases the join barrier exactly once.
pub struct DoneGuard<'a, Q: JobQueue> {
    queue: &'a Q,
}

impl<'a, Q: JobQueue> DoneGuard<'a, Q> {
    pub fn new(queue: &'a Q) -> Self {
        Self { queue }
    }
}

impl<Q: JobQueue> Drop for DoneGuard<'_, Q> {
    fn drop(&mut self) {
        self.queue.mark_done();
    }
}
