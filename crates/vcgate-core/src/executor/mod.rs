use std::{any::Any, sync::Arc};

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use vcgate_model::{ConvertOutput, ConvertRequest, LogSignals};

use crate::{
    converter::Converter,
    error::{CoreError, ModelError},
    metrics::MetricsHandle,
    now,
    queue::{AdmissionQueue, Entry, Turn},
    slot::JobSlot,
};

/// Drains the admission queue against the single slot and runs model calls.
pub struct JobExecutor {
    slot: Arc<JobSlot>,
    queue: Arc<AdmissionQueue>,
    converter: Arc<dyn Converter>,
    metrics: MetricsHandle,
    diffusion_steps_ceiling: u32,
}

impl JobExecutor {
    pub fn new(
        slot: Arc<JobSlot>,
        queue: Arc<AdmissionQueue>,
        converter: Arc<dyn Converter>,
        metrics: MetricsHandle,
        diffusion_steps_ceiling: u32,
    ) -> Self {
        Self {
            slot,
            queue,
            converter,
            metrics,
            diffusion_steps_ceiling,
        }
    }

    /// Dispatch loop. Exactly one instance may run per process.
    ///
    /// Returns `Ok` when `token` is cancelled and `InternalInvariantViolation`
    /// if the slot was found occupied at a point where only this loop can
    /// hand it out.
    pub async fn run(&self, token: CancellationToken) -> Result<(), CoreError> {
        info!(converter = self.converter.name(), "executor loop started");
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = self.slot.wait_idle() => {}
            }
            let entry = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                entry = self.queue.next_entry() => entry,
            };
            self.dispatch(entry)?;
        }
        info!("executor loop stopped");
        Ok(())
    }

    /// Grant the slot to `entry` and hand its waiter the turn.
    fn dispatch(&self, entry: Entry) -> Result<(), CoreError> {
        let Entry { job, permit, reply } = entry;

        let guard = self.slot.try_acquire(job.id.clone()).map_err(|busy| {
            error!(job = %job.id, occupant = %busy.occupant, "slot double-acquired");
            CoreError::InternalInvariantViolation(format!(
                "slot handed to {} while held by {}",
                job.id, busy.occupant
            ))
        })?;
        self.metrics.in_flight(true);

        let started = now();
        let turn = Turn {
            job,
            guard,
            permit,
            started,
        };
        self.metrics.job_started(turn.waited());
        debug!(job = %turn.job.id, waited_ms = turn.waited().as_millis() as u64, "turn granted");

        if let Err(Ok(turn)) = reply.send(Ok(turn)) {
            // Caller left between dequeue and hand-off; dropping the turn frees the slot.
            debug!(job = %turn.job.id, "caller gone before its turn");
            drop(turn);
            self.metrics.in_flight(false);
        }
        Ok(())
    }

    /// Run the model once for `turn`, holding the slot for the whole call.
    ///
    /// The call runs on its own task: if the caller is dropped mid-call the
    /// model still finishes, the slot is released and the result discarded.
    #[instrument(level = "debug", skip_all, fields(job = %turn.job.id))]
    pub async fn execute(
        &self,
        turn: Turn,
        request: ConvertRequest,
    ) -> Result<ConvertOutput, CoreError> {
        let Turn {
            job,
            guard,
            permit,
            started,
        } = turn;

        let requested = request.params.diffusion_steps;
        let request = ConvertRequest {
            params: request.params.clamped(self.diffusion_steps_ceiling),
            ..request
        };
        if request.params.diffusion_steps != requested {
            debug!(
                requested,
                applied = request.params.diffusion_steps,
                "diffusion steps clamped"
            );
        }
        info!(
            job = %job.id,
            diffusion_steps = request.params.diffusion_steps,
            length_adjust = request.params.length_adjust,
            convert_style = request.params.convert_style,
            "{} job {}",
            LogSignals::CONVERTING,
            job.id,
        );

        let converter = Arc::clone(&self.converter);
        let metrics = Arc::clone(&self.metrics);
        let job_id = job.id.clone();

        let supervised = tokio::spawn(async move {
            let call = tokio::spawn(async move { converter.convert(request).await });
            let outcome = match call.await {
                Ok(result) => result,
                Err(join) => Err(model_crash(join)),
            };

            let elapsed = now().saturating_duration_since(started);
            drop(guard);
            drop(permit);
            metrics.in_flight(false);

            match &outcome {
                Ok(_) => {
                    metrics.job_completed("succeeded", elapsed);
                    info!(job = %job_id, elapsed_ms = elapsed.as_millis() as u64, "conversion complete");
                }
                Err(e) => {
                    metrics.job_completed(e.as_label(), elapsed);
                    error!(
                        job = %job_id,
                        kind = e.as_label(),
                        "{} conversion failed: {e}",
                        LogSignals::RUNTIME_ERROR
                    );
                }
            }
            outcome
        });

        match supervised.await {
            Ok(outcome) => outcome.map_err(CoreError::from),
            Err(join) => Err(CoreError::ExecutionFailed(model_crash(join))),
        }
    }
}

fn model_crash(join: JoinError) -> ModelError {
    if join.is_panic() {
        ModelError::Fault(format!(
            "model call panicked: {}",
            panic_message(join.into_panic())
        ))
    } else {
        ModelError::Fault(format!("model call aborted: {join}"))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
