use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{JobKind, Workload};

/// Per-route contract published to the external autoscaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// HTTP path served by this route.
    pub route: String,
    /// Job class handled by the route.
    pub kind: JobKind,
    /// Whether requests on this route may run concurrently.
    pub allow_parallel: bool,
    /// Longest a request may wait before it is rejected.
    #[serde(with = "secs_serde")]
    pub max_queue_time: Duration,
    /// Fixed cost of one request.
    pub workload: Workload,
}

impl RouteConfig {
    /// `/convert`: serialized, five minute wait budget, cost 100.
    pub fn conversion() -> Self {
        Self {
            route: "/convert".to_string(),
            kind: JobKind::Conversion,
            allow_parallel: false,
            max_queue_time: Duration::from_secs(300),
            workload: 100.0,
        }
    }

    /// `/health`: parallel, ten second wait budget, cost 1.
    pub fn health() -> Self {
        Self {
            route: "/health".to_string(),
            kind: JobKind::Health,
            allow_parallel: true,
            max_queue_time: Duration::from_secs(10),
            workload: 1.0,
        }
    }

    pub fn with_max_queue_time(mut self, max_queue_time: Duration) -> Self {
        self.max_queue_time = max_queue_time;
        self
    }

    pub fn with_workload(mut self, workload: Workload) -> Self {
        self.workload = workload;
        self
    }
}

/// Log-line patterns the orchestrator scans for lifecycle signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSignals {
    pub on_load: Vec<String>,
    pub on_error: Vec<String>,
    pub on_info: Vec<String>,
}

impl LogSignals {
    pub const MODEL_READY: &'static str = "Models loaded successfully";
    pub const SERVER_LISTENING: &'static str = "Uvicorn running on";
    pub const TRACEBACK: &'static str = "Traceback (most recent call last):";
    pub const RUNTIME_ERROR: &'static str = "RuntimeError:";
    pub const OUT_OF_MEMORY: &'static str = "CUDA out of memory";
    pub const LOADING: &'static str = "Loading Seed-VC";
    pub const CONVERTING: &'static str = "Converting:";
}

impl Default for LogSignals {
    fn default() -> Self {
        Self {
            on_load: vec![Self::MODEL_READY.into(), Self::SERVER_LISTENING.into()],
            on_error: vec![
                Self::TRACEBACK.into(),
                Self::RUNTIME_ERROR.into(),
                Self::OUT_OF_MEMORY.into(),
            ],
            on_info: vec![Self::LOADING.into(), Self::CONVERTING.into()],
        }
    }
}

/// Everything the orchestrator needs to know about this worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerManifest {
    /// Stable identity of this worker instance.
    pub worker_id: String,
    pub routes: Vec<RouteConfig>,
    pub log_signals: LogSignals,
}

mod secs_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        d.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_match_deployment() {
        let c = RouteConfig::conversion();
        assert!(!c.allow_parallel);
        assert_eq!(c.max_queue_time, Duration::from_secs(300));
        assert_eq!(c.workload, 100.0);

        let h = RouteConfig::health();
        assert!(h.allow_parallel);
        assert_eq!(h.max_queue_time, Duration::from_secs(10));
        assert_eq!(h.workload, 1.0);
    }

    #[test]
    fn max_queue_time_serializes_as_seconds() {
        let json = serde_json::to_value(RouteConfig::health()).unwrap();
        assert_eq!(json["maxQueueTime"], 10.0);
        assert_eq!(json["allowParallel"], true);

        let back: RouteConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, RouteConfig::health());
    }

    #[test]
    fn negative_queue_time_is_rejected() {
        let mut json = serde_json::to_value(RouteConfig::health()).unwrap();
        json["maxQueueTime"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<RouteConfig>(json).is_err());
    }

    #[test]
    fn default_signals_contain_ready_line() {
        let s = LogSignals::default();
        assert!(s.on_load.iter().any(|l| l == LogSignals::MODEL_READY));
        assert_eq!(s.on_error.len(), 3);
    }
}
