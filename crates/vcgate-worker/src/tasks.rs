use std::{net::SocketAddr, sync::Arc};

use taskvisor::{BackoffPolicy, RestartPolicy, TaskError, TaskFn, TaskRef, TaskSpec};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vcgate_api::axum::Router;
use vcgate_core::Controller;
use vcgate_model::LogSignals;

use crate::probe::ReadinessProbe;

/// Exit status after the single-slot guarantee broke (`EX_SOFTWARE`).
pub const EXIT_INVARIANT_VIOLATION: i32 = 70;

const EXECUTOR_SLOT: &str = "vcgate-executor";
const SWEEPER_SLOT: &str = "vcgate-deadline-sweeper";
const PROBE_SLOT: &str = "vcgate-readiness-probe";
const HTTP_SLOT: &str = "vcgate-http";

/// Dispatch loop. An invariant violation takes the whole process down.
pub fn executor(controller: Arc<Controller>) -> TaskSpec {
    let task: TaskRef = TaskFn::arc(EXECUTOR_SLOT, move |ctx: CancellationToken| {
        let controller = Arc::clone(&controller);
        async move {
            match controller.run_executor(ctx).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_fatal() => {
                    error!(
                        "{} {e}; exiting with status {EXIT_INVARIANT_VIOLATION}",
                        LogSignals::RUNTIME_ERROR
                    );
                    std::process::exit(EXIT_INVARIANT_VIOLATION);
                }
                Err(e) => Err(TaskError::Fail {
                    reason: format!("executor: {e}"),
                }),
            }
        }
    });
    TaskSpec::new(task, RestartPolicy::OnFailure, BackoffPolicy::default(), None)
}

pub fn sweeper(controller: Arc<Controller>) -> TaskSpec {
    let task: TaskRef = TaskFn::arc(SWEEPER_SLOT, move |ctx: CancellationToken| {
        let controller = Arc::clone(&controller);
        async move {
            controller.run_sweeper(ctx).await;
            Ok(())
        }
    });
    TaskSpec::new(task, RestartPolicy::OnFailure, BackoffPolicy::default(), None)
}

/// Runs once: after the model settles into Failed there is nothing left to probe.
pub fn probe(probe: Arc<ReadinessProbe>) -> TaskSpec {
    let task: TaskRef = TaskFn::arc(PROBE_SLOT, move |ctx: CancellationToken| {
        let probe = Arc::clone(&probe);
        async move {
            probe.run(ctx).await;
            Ok(())
        }
    });
    TaskSpec::new(task, RestartPolicy::Never, BackoffPolicy::default(), None)
}

/// Serves the API until cancelled; rebinding is retried with backoff.
pub fn http(bind: SocketAddr, router: Router) -> TaskSpec {
    let task: TaskRef = TaskFn::arc(HTTP_SLOT, move |ctx: CancellationToken| {
        let router = router.clone();
        async move {
            if ctx.is_cancelled() {
                return Err(TaskError::Canceled);
            }
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .map_err(|e| TaskError::Fail {
                    reason: format!("bind {bind}: {e}"),
                })?;
            info!(
                "{} http://{bind} (Press CTRL+C to quit)",
                LogSignals::SERVER_LISTENING
            );
            vcgate_api::axum::serve(listener, router)
                .with_graceful_shutdown(async move { ctx.cancelled().await })
                .await
                .map_err(|e| TaskError::Fail {
                    reason: format!("http server: {e}"),
                })
        }
    });
    TaskSpec::new(task, RestartPolicy::OnFailure, BackoffPolicy::default(), None)
}
