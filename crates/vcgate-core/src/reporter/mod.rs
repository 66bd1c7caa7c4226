use std::{collections::HashMap, sync::Arc};

use vcgate_model::{HealthReport, JobKind, RouteConfig, Workload};

use crate::{error::CoreError, lifecycle::Lifecycle, queue::AdmissionQueue, slot::JobSlot};

/// Static per-kind cost table used by the autoscaler's capacity math.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadTable {
    weights: HashMap<JobKind, Workload>,
}

impl WorkloadTable {
    /// Build from the route table. Every kind needs exactly one finite, positive weight.
    pub fn from_routes(routes: &[RouteConfig]) -> Result<Self, CoreError> {
        let mut weights = HashMap::with_capacity(routes.len());
        for route in routes {
            if !route.workload.is_finite() || route.workload <= 0.0 {
                return Err(CoreError::InvalidConfig(format!(
                    "route {} has invalid workload {}",
                    route.route, route.workload
                )));
            }
            if weights.insert(route.kind, route.workload).is_some() {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate workload for kind {}",
                    route.kind
                )));
            }
        }
        if let Some(missing) = JobKind::ALL.iter().find(|k| !weights.contains_key(k)) {
            return Err(CoreError::InvalidConfig(format!(
                "no workload configured for kind {missing}"
            )));
        }
        Ok(Self { weights })
    }

    pub fn get(&self, kind: JobKind) -> Workload {
        self.weights.get(&kind).copied().unwrap_or_default()
    }
}

/// Read-only view over readiness, slot and queue.
///
/// Never waits on the slot or queue locks.
pub struct HealthReporter {
    lifecycle: Arc<Lifecycle>,
    slot: Arc<JobSlot>,
    queue: Arc<AdmissionQueue>,
    workloads: WorkloadTable,
}

impl HealthReporter {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        slot: Arc<JobSlot>,
        queue: Arc<AdmissionQueue>,
        workloads: WorkloadTable,
    ) -> Self {
        Self {
            lifecycle,
            slot,
            queue,
            workloads,
        }
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            ready: self.lifecycle.is_ready(),
            in_flight: self.slot.is_occupied(),
            queue_depth: self.queue.depth(),
        }
    }

    pub fn workload_estimate(&self, kind: JobKind) -> Workload {
        self.workloads.get(kind)
    }

    pub fn workloads(&self) -> &WorkloadTable {
        &self.workloads
    }
}
