mod config;
mod probe;
mod tasks;
mod upstream;

use std::sync::Arc;

use anyhow::anyhow;
use taskvisor::{Subscribe, Supervisor};
use tracing::info;
use vcgate_api::{ControllerAdapter, HttpApi, MetricsExporter};
use vcgate_core::{Controller, init_uptime, worker_id};
use vcgate_model::LogSignals;
use vcgate_observe::{Journal, logger_init};
use vcgate_prometheus::PrometheusMetrics;

use crate::{config::WorkerConfig, probe::ReadinessProbe, upstream::UpstreamConverter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Config + logger
    let cfg = WorkerConfig::from_env()?;
    logger_init(&cfg.logger)?;
    init_uptime();
    info!(
        worker = worker_id(),
        model_url = %cfg.model_url,
        "{} voice conversion worker",
        LogSignals::LOADING
    );

    // 2) Controller over the model server
    let metrics =
        PrometheusMetrics::new().map_err(|e| anyhow!("metrics registry: {e}"))?;
    let upstream = UpstreamConverter::new(&cfg.model_url, cfg.request_timeout)?;
    let controller = Controller::with_metrics(
        cfg.controller.clone(),
        Arc::new(upstream.clone()),
        Arc::new(metrics.clone()),
    )?;

    // 3) HTTP surface
    let exporter: MetricsExporter = {
        let metrics = metrics.clone();
        Arc::new(move || metrics.encode_text().map_err(|e| e.to_string()))
    };
    let adapter = ControllerAdapter::new(Arc::clone(&controller), worker_id())
        .with_exporter(exporter);
    let router = HttpApi::new(Arc::new(adapter)).router();

    // 4) Background tasks under supervision
    let probe = Arc::new(ReadinessProbe::new(
        upstream,
        Arc::clone(controller.lifecycle()),
        cfg.probe_interval,
        cfg.load_timeout,
        cfg.probe_failure_threshold,
    ));
    let specs = vec![
        tasks::executor(Arc::clone(&controller)),
        tasks::sweeper(Arc::clone(&controller)),
        tasks::probe(probe),
        tasks::http(cfg.bind, router),
    ];

    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Journal::new())];
    let sup = Supervisor::builder(Default::default())
        .with_subscribers(subscribers)
        .build();

    // 5) Run until a shutdown signal; the executor task closes the queue on cancel
    let outcome = sup.run(specs).await;
    controller.shutdown();
    outcome.map_err(|e| anyhow!("supervisor: {e}"))?;

    info!(uptime_s = vcgate_core::uptime_seconds(), "worker stopped");
    Ok(())
}
