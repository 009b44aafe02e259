//! Bounded-concurrency FIFO job scheduler.
//!
//! Jobs start in enqueue order and never more than `max_active` at once.
//! Each running job sends its output over an `async_channel`; the render
//! timeline drains them with [`FetchScheduler::poll`], which releases their
//! slots and starts queued jobs. A slot is held from start until its output
//! has been drained, so the number of jobs in flight never exceeds the
//! bound. A job that panics or is dropped by the runtime still releases its
//! slot. There is no priority, preemption or retry.

use std::{collections::VecDeque, future::Future, pin::Pin, sync::Arc};

use crate::runtime::Spawner;

/// Default concurrency for tile and model fetches.
pub const DEFAULT_MAX_ACTIVE: usize = 8;

type Job<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Reports a job's end over the channel exactly once. Dropping it unsent
/// reports a job that produced no output.
struct Completion<T> {
    tx: Option<async_channel::Sender<Option<T>>>,
}

impl<T> Completion<T> {
    fn finish(mut self, output: T) {
        if let Some(tx) = self.tx.take() {
            // The receiver is gone only when the scheduler was dropped.
            let _ = tx.try_send(Some(output));
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.try_send(None);
        }
    }
}

/// A FIFO queue of jobs producing `T`.
pub struct FetchScheduler<T> {
    name: &'static str,
    max_active: usize,
    active: usize,
    queue: VecDeque<Job<T>>,
    spawner: Arc<dyn Spawner>,
    tx: async_channel::Sender<Option<T>>,
    rx: async_channel::Receiver<Option<T>>,
}

impl<T> std::fmt::Debug for FetchScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchScheduler")
            .field("name", &self.name)
            .field("max_active", &self.max_active)
            .field("active", &self.active)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> FetchScheduler<T> {
    /// Create a scheduler running at most `max_active` jobs at once. A bound
    /// of zero is treated as one.
    #[must_use]
    pub fn new(name: &'static str, max_active: usize, spawner: Arc<dyn Spawner>) -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            name,
            max_active: max_active.max(1),
            active: 0,
            queue: VecDeque::new(),
            spawner,
            tx,
            rx,
        }
    }

    /// Queue a job, starting it immediately if a slot is free.
    pub fn enqueue(&mut self, job: impl Future<Output = T> + Send + 'static) {
        self.queue.push_back(Box::pin(job));
        self.pump();
    }

    fn pump(&mut self) {
        while self.active < self.max_active {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            self.active += 1;
            let completion = Completion {
                tx: Some(self.tx.clone()),
            };
            self.spawner.spawn(Box::pin(async move {
                let output = job.await;
                completion.finish(output);
            }));
        }
        tracing::trace!(
            scheduler = self.name,
            active = self.active,
            queued = self.queue.len(),
            "pumped"
        );
    }

    /// Drain finished jobs, release their slots and start queued jobs.
    ///
    /// Outputs are returned in completion order. Jobs that ended without
    /// output free their slot and are left out.
    pub fn poll(&mut self) -> Vec<T> {
        let mut finished = Vec::new();
        let mut ended = 0;
        while let Ok(output) = self.rx.try_recv() {
            ended += 1;
            finished.extend(output);
        }
        if ended > 0 {
            self.active = self.active.saturating_sub(ended);
            let lost = ended - finished.len();
            if lost > 0 {
                tracing::warn!(scheduler = self.name, lost, "jobs ended without output");
            }
            tracing::debug!(
                scheduler = self.name,
                finished = finished.len(),
                "jobs completed"
            );
            self.pump();
        }
        finished
    }

    /// Jobs started and not yet drained.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active
    }

    /// Jobs waiting for a slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Whether no job is running or queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active == 0 && self.queue.is_empty()
    }

    /// Drop every queued job that has not started.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }
}
