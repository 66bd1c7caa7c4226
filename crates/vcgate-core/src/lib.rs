//! Bounded single-slot job admission controller.
//!
//! The wrapped model cannot serve concurrent calls, so every conversion passes
//! through one [`JobSlot`]. Requests wait in a FIFO [`AdmissionQueue`] with a
//! per-job deadline; a single [`JobExecutor`] loop hands out turns. Health
//! checks never touch the slot.

pub mod error;
pub use error::{CoreError, ModelError};

mod config;
pub use config::ControllerConfig;

mod converter;
pub use converter::Converter;

mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics};

mod slot;
pub use slot::{JobSlot, SlotBusy, SlotGuard};

mod queue;
pub use queue::{AdmissionQueue, Pending, Turn};

mod executor;
pub use executor::JobExecutor;

mod reporter;
pub use reporter::{HealthReporter, WorkloadTable};

mod lifecycle;
pub use lifecycle::Lifecycle;

mod controller;
pub use controller::{Controller, Conversion};

mod system;
pub use system::{init_uptime, uptime_seconds, worker_id};

/// Current instant on the runtime clock.
///
/// Goes through tokio so that paused test clocks apply to deadlines too.
#[inline]
pub(crate) fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
