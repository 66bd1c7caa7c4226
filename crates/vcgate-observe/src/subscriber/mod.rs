use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use taskvisor::{Event, EventKind, Subscribe};
use tracing::{Level, debug, error, info, trace, warn};

/// Forwards supervisor events of the worker's background tasks to `tracing`.
///
/// Failures of the executor, sweeper, probe or HTTP task show up at error
/// level so the orchestrator's log scan can pick them up.
pub struct Journal {
    failures: AtomicU64,
    capacity: usize,
}

impl Journal {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            failures: AtomicU64::new(0),
            capacity,
        }
    }

    /// Task failures seen so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for Journal {
    async fn on_event(&self, event: &Event) {
        let task = event.task.as_deref().unwrap_or("-");
        let reason = event.reason.as_deref().unwrap_or("");
        let attempt = event.attempt.unwrap_or(0);

        if matches!(event.kind, EventKind::TaskFailed | EventKind::ActorDead) {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        match severity(event.kind) {
            Level::ERROR => error!(task, attempt, reason, "{}", describe(event.kind)),
            Level::WARN => warn!(
                task,
                reason,
                timeout_ms = event.timeout_ms.unwrap_or(0),
                "{}",
                describe(event.kind)
            ),
            Level::INFO => info!(task, attempt, "{}", describe(event.kind)),
            Level::DEBUG => debug!(
                task,
                attempt,
                delay_ms = event.delay_ms.unwrap_or(0),
                reason,
                "{}",
                describe(event.kind)
            ),
            _ => trace!(task, kind = ?event.kind, "supervisor event"),
        }
    }

    fn name(&self) -> &'static str {
        "vcgate-journal"
    }

    fn queue_capacity(&self) -> usize {
        self.capacity
    }
}

fn severity(kind: EventKind) -> Level {
    match kind {
        EventKind::TaskFailed | EventKind::ActorDead | EventKind::SubscriberPanicked => {
            Level::ERROR
        }
        EventKind::TimeoutHit | EventKind::GraceExceeded | EventKind::SubscriberOverflow => {
            Level::WARN
        }
        EventKind::TaskStarting
        | EventKind::ShutdownRequested
        | EventKind::AllStoppedWithinGrace => Level::INFO,
        EventKind::BackoffScheduled | EventKind::ActorExhausted => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn describe(kind: EventKind) -> &'static str {
    match kind {
        EventKind::TaskFailed => "background task failed",
        EventKind::ActorDead => "background task stopped permanently",
        EventKind::SubscriberPanicked => "event subscriber panicked",
        EventKind::TimeoutHit => "background task hit its timeout",
        EventKind::GraceExceeded => "tasks did not stop within the grace period",
        EventKind::SubscriberOverflow => "supervisor event dropped",
        EventKind::TaskStarting => "background task starting",
        EventKind::ShutdownRequested => "shutdown requested",
        EventKind::AllStoppedWithinGrace => "all background tasks stopped",
        EventKind::BackoffScheduled => "background task restart scheduled",
        EventKind::ActorExhausted => "background task will not be restarted",
        _ => "supervisor event",
    }
}
