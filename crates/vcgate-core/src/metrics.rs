use std::{sync::Arc, time::Duration};

use vcgate_model::JobKind;

/// Sink for controller measurements.
///
/// Every hook defaults to a no-op so backends implement only what they export.
pub trait MetricsBackend: Send + Sync + 'static {
    /// A job passed the readiness gate and the capacity check.
    fn job_admitted(&self, _kind: JobKind) {}

    /// A job was turned away; `reason` is a [`CoreError::as_label`](crate::CoreError::as_label).
    fn job_rejected(&self, _reason: &'static str) {}

    /// A job got the slot after waiting `waited`.
    fn job_started(&self, _waited: Duration) {}

    /// The model call returned; `outcome` is `"succeeded"` or a model error label.
    fn job_completed(&self, _outcome: &'static str, _duration: Duration) {}

    /// Number of jobs waiting for a turn.
    fn queue_depth(&self, _depth: usize) {}

    /// Whether the slot is occupied.
    fn in_flight(&self, _busy: bool) {}
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

/// Backend that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {}

impl NoopMetrics {
    pub fn handle() -> MetricsHandle {
        Arc::new(NoopMetrics)
    }
}
