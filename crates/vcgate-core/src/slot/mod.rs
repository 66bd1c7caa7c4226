use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use thiserror::Error;
use tokio::sync::Notify;
use tracing::{error, trace};
use vcgate_model::{JobId, SlotState};

/// The slot is held by another job.
#[derive(Debug, Clone, Error)]
#[error("slot is occupied by job {occupant}")]
pub struct SlotBusy {
    pub occupant: JobId,
}

/// Exclusive execution slot representing the one model instance.
///
/// At most one [`SlotGuard`] exists at any time. Dropping the guard is the
/// only way to release the slot, so release happens exactly once on every
/// exit path, including panics and cancellation of the holder.
pub struct JobSlot {
    state: Mutex<SlotState>,
    /// Mirror of `state` for lock-free reads.
    occupied: AtomicBool,
    idle: Notify,
}

impl JobSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState::Idle),
            occupied: AtomicBool::new(false),
            idle: Notify::new(),
        })
    }

    /// Take the slot for `job` or report who holds it.
    pub fn try_acquire(self: &Arc<Self>, job: JobId) -> Result<SlotGuard, SlotBusy> {
        let mut state = self.lock();
        if let SlotState::Occupied(occupant) = &*state {
            return Err(SlotBusy {
                occupant: occupant.clone(),
            });
        }
        *state = SlotState::Occupied(job.clone());
        self.occupied.store(true, Ordering::Release);
        trace!(job = %job, "slot acquired");

        Ok(SlotGuard {
            slot: Arc::clone(self),
            job,
        })
    }

    /// Wait until the slot is free, then take it for `job`.
    pub async fn acquire(self: &Arc<Self>, job: JobId) -> SlotGuard {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_acquire(job.clone()) {
                Ok(guard) => return guard,
                Err(_) => notified.await,
            }
        }
    }

    /// Resolve once nobody holds the slot.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_occupied() {
                return;
            }
            notified.await;
        }
    }

    /// Lock-free occupancy read.
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SlotState {
        self.lock().clone()
    }

    fn release(&self, job: &JobId) {
        {
            let mut state = self.lock();
            match &*state {
                SlotState::Occupied(occupant) if occupant == job => {
                    *state = SlotState::Idle;
                    self.occupied.store(false, Ordering::Release);
                    trace!(job = %job, "slot released");
                }
                other => {
                    error!(job = %job, state = ?other, "release by a job that does not hold the slot");
                    return;
                }
            }
        }
        self.idle.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // The critical sections never panic; recover the state if a holder did.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of slot ownership; releases the slot on drop.
pub struct SlotGuard {
    slot: Arc<JobSlot>,
    job: JobId,
}

impl SlotGuard {
    pub fn job_id(&self) -> &JobId {
        &self.job
    }
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard").field("job", &self.job).finish()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.release(&self.job);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn second_acquire_is_busy() {
        let slot = JobSlot::new();
        let guard = slot.try_acquire(JobId::from("a")).unwrap();
        assert!(slot.is_occupied());
        assert_eq!(slot.state(), SlotState::Occupied(JobId::from("a")));

        let busy = slot.try_acquire(JobId::from("b")).unwrap_err();
        assert_eq!(busy.occupant, JobId::from("a"));

        drop(guard);
        assert!(!slot.is_occupied());
        assert_eq!(slot.state(), SlotState::Idle);
        assert!(slot.try_acquire(JobId::from("b")).is_ok());
    }

    #[test]
    fn guard_released_on_panic() {
        let slot = JobSlot::new();
        let cloned = Arc::clone(&slot);
        let result = std::thread::spawn(move || {
            let _guard = cloned.try_acquire(JobId::from("crash")).unwrap();
            panic!("model blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!slot.is_occupied());
    }

    #[tokio::test]
    async fn blocking_acquire_waits_for_release() {
        let slot = JobSlot::new();
        let first = slot.try_acquire(JobId::from("first")).unwrap();

        let waiter = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.acquire(JobId::from("second")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = waiter.await.unwrap();
        assert_eq!(second.job_id(), &JobId::from("second"));
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_free() {
        let slot = JobSlot::new();
        tokio::time::timeout(Duration::from_millis(50), slot.wait_idle())
            .await
            .expect("idle slot must not block");
    }
}
