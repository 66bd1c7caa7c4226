mod job_id;
pub use job_id::JobId;

mod job;
pub use job::{Job, MAX_QUEUE_TIME_CEILING};

mod slot_state;
pub use slot_state::SlotState;

mod readiness;
pub use readiness::{Readiness, ReadinessParseError};

mod health;
pub use health::{HealthReport, HealthStatus};

mod route;
pub use route::{LogSignals, RouteConfig, WorkerManifest};

/// Workload weight used by the external autoscaler's capacity math.
///
/// Static per job kind; never derived from payload size.
pub type Workload = f64;

/// Upper bound applied to the caller-supplied diffusion step count.
pub const DEFAULT_DIFFUSION_STEPS_CEILING: u32 = 50;
