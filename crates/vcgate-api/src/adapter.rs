use std::sync::Arc;

use async_trait::async_trait;
use vcgate_core::{Controller, Conversion, uptime_seconds};
use vcgate_model::{ConvertRequest, HealthStatus, JobKind, WorkerManifest};

use crate::{
    error::ApiError,
    handler::{ApiHandler, StatusReport},
};

/// Renders the metrics registry as Prometheus text.
pub type MetricsExporter = Arc<dyn Fn() -> Result<String, String> + Send + Sync>;

/// [`ApiHandler`] that delegates straight to a [`Controller`].
pub struct ControllerAdapter {
    controller: Arc<Controller>,
    worker_id: String,
    exporter: Option<MetricsExporter>,
}

impl ControllerAdapter {
    pub fn new(controller: Arc<Controller>, worker_id: impl Into<String>) -> Self {
        Self {
            controller,
            worker_id: worker_id.into(),
            exporter: None,
        }
    }

    pub fn with_exporter(mut self, exporter: MetricsExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }
}

#[async_trait]
impl ApiHandler for ControllerAdapter {
    async fn convert(&self, request: ConvertRequest) -> Result<Conversion, ApiError> {
        self.controller
            .submit_conversion(request)
            .await
            .map_err(ApiError::from)
    }

    fn health(&self) -> HealthStatus {
        self.controller.health()
    }

    fn status(&self) -> StatusReport {
        StatusReport {
            report: self.controller.report(),
            readiness: self.controller.lifecycle().readiness(),
            workloads: JobKind::ALL
                .iter()
                .map(|k| (k.as_str(), self.controller.workload_estimate(*k)))
                .collect(),
            uptime_seconds: uptime_seconds(),
        }
    }

    fn manifest(&self) -> WorkerManifest {
        self.controller.manifest(self.worker_id.clone())
    }

    fn metrics(&self) -> Result<Option<String>, ApiError> {
        match &self.exporter {
            Some(export) => export().map(Some).map_err(ApiError::Internal),
            None => Ok(None),
        }
    }
}
