use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use vcgate_core::Conversion;
use vcgate_model::{ConvertRequest, HealthReport, HealthStatus, Readiness, WorkerManifest};

use crate::error::ApiError;

/// Load snapshot served on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub report: HealthReport,
    pub readiness: Readiness,
    /// Workload weight per job kind.
    pub workloads: BTreeMap<&'static str, f64>,
    pub uptime_seconds: u64,
}

/// Backend behind the HTTP routes.
///
/// Implement it to put auth, tenancy or a different controller in front of
/// the same routes; [`ControllerAdapter`](crate::ControllerAdapter) covers the common case.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Run one conversion through the admission controller.
    async fn convert(&self, request: ConvertRequest) -> Result<Conversion, ApiError>;

    /// Liveness answer. Never queued.
    fn health(&self) -> HealthStatus;

    fn status(&self) -> StatusReport;

    fn manifest(&self) -> WorkerManifest;

    /// Prometheus text exposition, `None` when metrics are not exported.
    fn metrics(&self) -> Result<Option<String>, ApiError> {
        Ok(None)
    }
}
