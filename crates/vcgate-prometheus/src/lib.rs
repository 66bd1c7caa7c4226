//! Prometheus backend for the vcgate admission controller.
//!
//! [`PrometheusMetrics`] implements [`vcgate_core::MetricsBackend`]; pass a
//! clone of it to `Controller::with_metrics` and serve [`PrometheusMetrics::encode_text`]
//! from the HTTP layer.
//!
//! ## Metrics
//! - `vcgate_jobs_admitted_total{kind}` - Counter
//! - `vcgate_jobs_rejected_total{reason}` - Counter
//! - `vcgate_jobs_completed_total{outcome}` - Counter
//! - `vcgate_job_duration_seconds` - Histogram
//! - `vcgate_queue_wait_seconds` - Histogram
//! - `vcgate_queue_depth` - Gauge
//! - `vcgate_in_flight` - Gauge (0 or 1)

mod backend;
pub use backend::PrometheusMetrics;
