use std::time::{Duration, Instant};

use crate::{JobId, JobKind, Workload};

/// Longest queue window a route may configure.
pub const MAX_QUEUE_TIME_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

/// Admission record of a single request.
///
/// Created on arrival and owned by the admission queue until it is dequeued.
/// The deadline is fixed at creation: `arrival + max_queue_time`, with the
/// window capped at [`MAX_QUEUE_TIME_CEILING`].
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Route class the job belongs to.
    pub kind: JobKind,
    /// When the request was admitted.
    pub arrival: Instant,
    /// Latest instant the job may still start.
    pub deadline: Instant,
    /// Static cost estimate reported to the autoscaler.
    pub workload: Workload,
}

impl Job {
    /// Create a job with an explicit arrival instant.
    pub fn arriving_at(
        kind: JobKind,
        arrival: Instant,
        max_queue_time: Duration,
        workload: Workload,
    ) -> Self {
        let window = max_queue_time.min(MAX_QUEUE_TIME_CEILING);
        Self {
            id: JobId::new(),
            kind,
            arrival,
            deadline: arrival.checked_add(window).unwrap_or(arrival),
            workload,
        }
    }

    /// Returns `true` once `now` has reached the deadline.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Time spent waiting since arrival.
    #[inline]
    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.arrival)
    }
}
