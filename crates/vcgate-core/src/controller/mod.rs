use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use vcgate_model::{
    ConvertOutput, ConvertRequest, HealthReport, HealthStatus, Job, JobId, JobKind, LogSignals,
    RouteConfig, SlotState, WorkerManifest, Workload,
};

use crate::{
    config::ControllerConfig,
    converter::Converter,
    error::CoreError,
    executor::JobExecutor,
    lifecycle::Lifecycle,
    metrics::{MetricsHandle, NoopMetrics},
    now,
    queue::AdmissionQueue,
    reporter::{HealthReporter, WorkloadTable},
    slot::JobSlot,
};

/// Finished conversion handed back to the request handler.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub job_id: JobId,
    pub output: ConvertOutput,
}

/// Entry point for request handlers and the worker binary.
///
/// Owns the slot, queue, executor, reporter and lifecycle of one model
/// instance. Share it behind an `Arc`.
pub struct Controller {
    config: ControllerConfig,
    lifecycle: Arc<Lifecycle>,
    slot: Arc<JobSlot>,
    queue: Arc<AdmissionQueue>,
    executor: JobExecutor,
    reporter: HealthReporter,
    metrics: MetricsHandle,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        converter: Arc<dyn Converter>,
    ) -> Result<Arc<Self>, CoreError> {
        Self::with_metrics(config, converter, NoopMetrics::handle())
    }

    pub fn with_metrics(
        config: ControllerConfig,
        converter: Arc<dyn Converter>,
        metrics: MetricsHandle,
    ) -> Result<Arc<Self>, CoreError> {
        config.validate()?;
        let workloads = WorkloadTable::from_routes(&config.routes())?;

        let lifecycle = Arc::new(Lifecycle::new());
        let slot = JobSlot::new();
        let queue = AdmissionQueue::new(config.max_queue_depth, Arc::clone(&metrics));
        let executor = JobExecutor::new(
            Arc::clone(&slot),
            Arc::clone(&queue),
            converter,
            Arc::clone(&metrics),
            config.diffusion_steps_ceiling,
        );
        let reporter = HealthReporter::new(
            Arc::clone(&lifecycle),
            Arc::clone(&slot),
            Arc::clone(&queue),
            workloads,
        );

        info!(
            max_queue_depth = config.max_queue_depth,
            max_queue_time_s = config.conversion.max_queue_time.as_secs_f64(),
            diffusion_steps_ceiling = config.diffusion_steps_ceiling,
            "admission controller configured"
        );
        Ok(Arc::new(Self {
            config,
            lifecycle,
            slot,
            queue,
            executor,
            reporter,
            metrics,
        }))
    }

    /// Admit, wait for the slot and run one conversion.
    ///
    /// Dropping the returned future before the turn arrives removes the job
    /// from the queue. Dropping it mid-call lets the model finish and frees
    /// the slot; the result is discarded.
    #[instrument(level = "debug", skip_all)]
    pub async fn submit_conversion(
        &self,
        request: ConvertRequest,
    ) -> Result<Conversion, CoreError> {
        let route = &self.config.conversion;
        if !route.kind.bypasses_readiness() && !self.lifecycle.is_ready() {
            self.metrics.job_rejected(CoreError::NotReady.as_label());
            return Err(CoreError::NotReady);
        }

        let job = Job::arriving_at(
            JobKind::Conversion,
            now(),
            route.max_queue_time,
            route.workload,
        );
        let job_id = job.id.clone();

        let pending = self.queue.enqueue(job)?;
        debug!(job = %job_id, depth = self.queue.depth(), "waiting for turn");

        let turn = pending.await_turn().await?;
        let output = self
            .executor
            .execute(turn, request.with_knobs(self.config.knobs))
            .await?;
        Ok(Conversion { job_id, output })
    }

    /// Health check. Slot-less, never queued, answered in every state.
    pub fn health(&self) -> HealthStatus {
        self.metrics.job_admitted(JobKind::Health);
        HealthStatus::from_readiness(self.lifecycle.readiness())
    }

    pub fn report(&self) -> HealthReport {
        self.reporter.report()
    }

    pub fn workload_estimate(&self, kind: JobKind) -> Workload {
        self.reporter.workload_estimate(kind)
    }

    pub fn workloads(&self) -> &WorkloadTable {
        self.reporter.workloads()
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn slot_state(&self) -> SlotState {
        self.slot.state()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn routes(&self) -> Vec<RouteConfig> {
        self.config.routes()
    }

    pub fn manifest(&self, worker_id: impl Into<String>) -> WorkerManifest {
        WorkerManifest {
            worker_id: worker_id.into(),
            routes: self.routes(),
            log_signals: LogSignals::default(),
        }
    }

    /// Executor dispatch loop. Run exactly once per controller.
    ///
    /// Once `token` is cancelled no more turns are handed out, so the queue
    /// is closed and its waiters fail with `Shutdown` right away.
    pub async fn run_executor(&self, token: CancellationToken) -> Result<(), CoreError> {
        self.executor.run(token).await?;
        self.shutdown();
        Ok(())
    }

    /// Periodic deadline sweep; bounds the wait of queued jobs when nothing else happens.
    pub async fn run_sweeper(&self, token: CancellationToken) {
        let mut tick = tokio::time::interval(self.config.sweep_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    let removed = self.queue.sweep_expired(now());
                    if removed > 0 {
                        debug!(removed, "sweep expired queued jobs");
                    }
                }
            }
        }
    }

    /// Spawn the executor and sweeper on the current runtime.
    ///
    /// For embedding and tests; the worker binary supervises both instead.
    pub fn spawn_background(
        self: &Arc<Self>,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), CoreError>> {
        let sweeper = Arc::clone(self);
        let sweep_token = token.clone();
        tokio::spawn(async move { sweeper.run_sweeper(sweep_token).await });

        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.run_executor(token).await })
    }

    /// Refuse new work and fail everything still waiting with `Shutdown`.
    pub fn shutdown(&self) {
        info!(waiting = self.queue.depth(), "admission controller shutting down");
        self.queue.close();
    }
}
