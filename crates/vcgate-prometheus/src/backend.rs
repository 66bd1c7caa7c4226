use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use vcgate_core::MetricsBackend;
use vcgate_model::JobKind;

/// Conversions take seconds to minutes.
const DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0];
const WAIT_BUCKETS: &[f64] = &[0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0];

/// Controller metrics kept in a private registry.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    admitted: IntCounterVec,
    rejected: IntCounterVec,
    completed: IntCounterVec,
    duration: Histogram,
    queue_wait: Histogram,
    queue_depth: IntGauge,
    in_flight: IntGauge,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let admitted = IntCounterVec::new(
            Opts::new("vcgate_jobs_admitted_total", "Jobs admitted by kind"),
            &["kind"],
        )?;
        let rejected = IntCounterVec::new(
            Opts::new("vcgate_jobs_rejected_total", "Jobs turned away by reason"),
            &["reason"],
        )?;
        let completed = IntCounterVec::new(
            Opts::new("vcgate_jobs_completed_total", "Model calls finished by outcome"),
            &["outcome"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new("vcgate_job_duration_seconds", "Time a job held the slot")
                .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        let queue_wait = Histogram::with_opts(
            HistogramOpts::new("vcgate_queue_wait_seconds", "Time a job waited for its turn")
                .buckets(WAIT_BUCKETS.to_vec()),
        )?;
        let queue_depth = IntGauge::new("vcgate_queue_depth", "Jobs waiting for the slot")?;
        let in_flight = IntGauge::new("vcgate_in_flight", "1 while a model call holds the slot")?;

        registry.register(Box::new(admitted.clone()))?;
        registry.register(Box::new(rejected.clone()))?;
        registry.register(Box::new(completed.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(queue_wait.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            admitted,
            rejected,
            completed,
            duration,
            queue_wait,
            queue_depth,
            in_flight,
        })
    }

    /// Text exposition format, as served on `/metrics`.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn job_admitted(&self, kind: JobKind) {
        self.admitted.with_label_values(&[kind.as_str()]).inc();
    }

    fn job_rejected(&self, reason: &'static str) {
        self.rejected.with_label_values(&[reason]).inc();
    }

    fn job_started(&self, waited: Duration) {
        self.queue_wait.observe(waited.as_secs_f64());
    }

    fn job_completed(&self, outcome: &'static str, duration: Duration) {
        self.completed.with_label_values(&[outcome]).inc();
        self.duration.observe(duration.as_secs_f64());
    }

    fn queue_depth(&self, depth: usize) {
        self.queue_depth.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    fn in_flight(&self, busy: bool) {
        self.in_flight.set(i64::from(busy));
    }
}
