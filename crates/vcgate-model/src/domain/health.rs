use serde::{Deserialize, Serialize};

use crate::Readiness;

/// Point-in-time snapshot of controller state for scaling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Model is loaded and accepting conversions.
    pub ready: bool,
    /// A job currently holds the execution slot.
    pub in_flight: bool,
    /// Jobs admitted and still waiting for their turn.
    pub queue_depth: usize,
}

/// Reply of the health route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `"healthy"` unless the model failed irrecoverably.
    pub status: String,
    pub ready: bool,
    pub readiness: Readiness,
}

impl HealthStatus {
    pub fn from_readiness(readiness: Readiness) -> Self {
        let status = if readiness.is_terminal() {
            "unhealthy"
        } else {
            "healthy"
        };
        Self {
            status: status.to_string(),
            ready: readiness == Readiness::Ready,
            readiness,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
