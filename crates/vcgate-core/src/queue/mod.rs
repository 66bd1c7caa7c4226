//! # Admission queue
//!
//! FIFO waiting area for conversions that arrive while the slot is busy.
//!
//! ## Invariants
//! - Admitted-but-unfinished jobs never exceed the configured capacity.
//!   A capacity permit travels with the job from admission until its model
//!   call returns (or it times out, or the caller walks away).
//! - Jobs start in arrival order; removing an expired or abandoned job keeps
//!   the relative order of the rest.
//! - A job whose deadline passed before it was dequeued is never executed.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError, oneshot};
use tracing::{debug, trace, warn};
use vcgate_model::{Job, JobId};

use crate::{error::CoreError, metrics::MetricsHandle, now, slot::SlotGuard};

/// Ready-to-execute token handed to a waiting caller.
///
/// Owns the slot guard: the slot stays occupied for as long as the turn
/// (or the execution it is moved into) is alive.
#[derive(Debug)]
pub struct Turn {
    pub(crate) job: Job,
    pub(crate) guard: SlotGuard,
    pub(crate) permit: OwnedSemaphorePermit,
    pub(crate) started: Instant,
}

impl Turn {
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Time the job spent in the queue.
    pub fn waited(&self) -> std::time::Duration {
        self.started.saturating_duration_since(self.job.arrival)
    }
}

type TurnResult = Result<Turn, CoreError>;

/// A queued job as seen by the executor.
pub(crate) struct Entry {
    pub(crate) job: Job,
    pub(crate) permit: OwnedSemaphorePermit,
    pub(crate) reply: oneshot::Sender<TurnResult>,
}

pub struct AdmissionQueue {
    entries: Mutex<VecDeque<Entry>>,
    /// Mirror of `entries.len()` for lock-free reads.
    depth: AtomicUsize,
    capacity: usize,
    permits: Arc<Semaphore>,
    arrived: Notify,
    metrics: MetricsHandle,
}

impl AdmissionQueue {
    pub fn new(capacity: usize, metrics: MetricsHandle) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            depth: AtomicUsize::new(0),
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
            arrived: Notify::new(),
            metrics,
        })
    }

    /// Admit `job` or fail with `QueueFull`. Never blocks.
    pub fn enqueue(self: &Arc<Self>, job: Job) -> Result<Pending, CoreError> {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                debug!(job = %job.id, capacity = self.capacity, "queue full, job rejected");
                self.metrics.job_rejected("queue_full");
                return Err(CoreError::QueueFull {
                    capacity: self.capacity,
                });
            }
            Err(TryAcquireError::Closed) => return Err(CoreError::Shutdown),
        };

        let (reply, rx) = oneshot::channel();
        let pending = Pending {
            id: job.id.clone(),
            deadline: job.deadline,
            rx,
            queue: Arc::clone(self),
            settled: false,
        };
        {
            let mut entries = self.lock();
            entries.push_back(Entry { job, permit, reply });
            self.publish_depth(entries.len());
        }
        trace!(job = %pending.id, "job enqueued");

        self.metrics.job_admitted(vcgate_model::JobKind::Conversion);
        self.arrived.notify_one();
        self.sweep_expired(now());
        Ok(pending)
    }

    /// Jobs waiting for a turn. Lock-free.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove every job whose deadline has passed and fail its waiter.
    ///
    /// Returns the number of jobs removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let expired: Vec<Entry> = {
            let mut entries = self.lock();
            let mut expired = Vec::new();
            let mut i = 0;
            while i < entries.len() {
                if entries[i].job.is_expired(now) {
                    expired.extend(entries.remove(i));
                } else {
                    i += 1;
                }
            }
            if !expired.is_empty() {
                self.publish_depth(entries.len());
            }
            expired
        };

        let count = expired.len();
        for entry in expired {
            self.fail_expired(entry, now);
        }
        count
    }

    /// Stop admitting and fail every waiting job with `Shutdown`.
    pub fn close(&self) {
        self.permits.close();
        let drained: Vec<Entry> = {
            let mut entries = self.lock();
            let drained = entries.drain(..).collect();
            self.publish_depth(0);
            drained
        };
        for entry in drained {
            let _ = entry.reply.send(Err(CoreError::Shutdown));
        }
    }

    /// Wait for the oldest live entry and take it off the queue.
    pub(crate) async fn next_entry(&self) -> Entry {
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.pop_live(now()) {
                return entry;
            }
            notified.await;
        }
    }

    /// Pop the front entry, discarding expired and abandoned ones on the way.
    fn pop_live(&self, now: Instant) -> Option<Entry> {
        let mut expired = Vec::new();
        let live = {
            let mut entries = self.lock();
            let mut live = None;
            while let Some(entry) = entries.pop_front() {
                if entry.reply.is_closed() {
                    trace!(job = %entry.job.id, "dropping abandoned job");
                    continue;
                }
                if entry.job.is_expired(now) {
                    expired.push(entry);
                    continue;
                }
                live = Some(entry);
                break;
            }
            self.publish_depth(entries.len());
            live
        };

        for entry in expired {
            self.fail_expired(entry, now);
        }
        live
    }

    /// Take `id` out of the queue if it is still waiting.
    fn remove(&self, id: &JobId) -> Option<Entry> {
        let mut entries = self.lock();
        let pos = entries.iter().position(|e| &e.job.id == id)?;
        let entry = entries.remove(pos);
        self.publish_depth(entries.len());
        entry
    }

    fn fail_expired(&self, entry: Entry, now: Instant) {
        let waited = self.note_expired(&entry.job, now);
        let _ = entry.reply.send(Err(CoreError::QueueTimeout { waited }));
    }

    fn note_expired(&self, job: &Job, now: Instant) -> std::time::Duration {
        let waited = job.waited(now);
        warn!(job = %job.id, waited_ms = waited.as_millis() as u64, "job exceeded its queue deadline");
        self.metrics.job_rejected("queue_timeout");
        waited
    }

    fn publish_depth(&self, depth: usize) {
        self.depth.store(depth, Ordering::Release);
        self.metrics.queue_depth(depth);
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Caller-side handle of a queued job.
///
/// Dropping it before the turn arrives removes the job from the queue.
pub struct Pending {
    id: JobId,
    deadline: Instant,
    rx: oneshot::Receiver<TurnResult>,
    queue: Arc<AdmissionQueue>,
    settled: bool,
}

impl Pending {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Suspend until the executor grants this job the slot, or the deadline passes.
    pub async fn await_turn(mut self) -> Result<Turn, CoreError> {
        let deadline = tokio::time::Instant::from_std(self.deadline);

        let outcome = tokio::select! {
            biased;
            res = &mut self.rx => res,
            _ = tokio::time::sleep_until(deadline) => {
                if let Some(entry) = self.queue.remove(&self.id) {
                    self.settled = true;
                    let waited = self.queue.note_expired(&entry.job, now());
                    return Err(CoreError::QueueTimeout { waited });
                }
                // Already dequeued: the executor's answer is on its way.
                (&mut self.rx).await
            }
        };
        self.settled = true;

        // A dropped sender without an answer only happens when the controller goes away.
        outcome.unwrap_or(Err(CoreError::Shutdown))
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self.queue.remove(&self.id).is_some() {
            debug!(job = %self.id, "caller abandoned job before its turn");
        }
    }
}
