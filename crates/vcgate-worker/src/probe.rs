use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vcgate_core::Lifecycle;

use crate::upstream::UpstreamConverter;

/// Drives the lifecycle from the model server's `/health`.
///
/// Marks Ready once the server reports its models loaded, Failed if that
/// does not happen within the load timeout or if the server stops answering
/// for `failure_threshold` polls in a row afterwards.
pub struct ReadinessProbe {
    upstream: UpstreamConverter,
    lifecycle: Arc<Lifecycle>,
    interval: Duration,
    load_timeout: Duration,
    failure_threshold: u32,
}

impl ReadinessProbe {
    pub fn new(
        upstream: UpstreamConverter,
        lifecycle: Arc<Lifecycle>,
        interval: Duration,
        load_timeout: Duration,
        failure_threshold: u32,
    ) -> Self {
        Self {
            upstream,
            lifecycle,
            interval,
            load_timeout,
            failure_threshold,
        }
    }

    /// Poll until the model settles into Failed or `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        if self.wait_loaded(&token).await {
            self.watch(&token).await;
        }
    }

    /// Returns `true` once the model is Ready.
    async fn wait_loaded(&self, token: &CancellationToken) -> bool {
        if self.lifecycle.is_ready() {
            return true;
        }
        let deadline = Instant::now() + self.load_timeout;
        info!(url = self.upstream.base_url(), "waiting for model server to load");

        loop {
            match self.upstream.health().await {
                Ok(h) if h.models_loaded => {
                    info!(
                        status = %h.status,
                        device = h.device.as_deref().unwrap_or("unknown"),
                        "model server loaded"
                    );
                    return self.lifecycle.mark_ready().is_ok();
                }
                Ok(_) => debug!("model server up, models still loading"),
                Err(e) => debug!(error = %e, "model server not answering yet"),
            }

            if Instant::now() >= deadline {
                let reason = format!("models not loaded after {:?}", self.load_timeout);
                let _ = self.lifecycle.mark_failed(&reason);
                return false;
            }
            if self.pause(token).await {
                return false;
            }
        }
    }

    async fn watch(&self, token: &CancellationToken) {
        let mut failures = 0u32;
        loop {
            if self.pause(token).await {
                return;
            }
            match self.upstream.health().await {
                Ok(h) if h.models_loaded => failures = 0,
                Ok(_) => failures += 1,
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, failures, "model health check failed");
                }
            }
            if failures >= self.failure_threshold {
                let reason = format!("model server unhealthy for {failures} consecutive checks");
                let _ = self.lifecycle.mark_failed(&reason);
                return;
            }
        }
    }

    /// Sleep one interval; `true` if cancelled meanwhile.
    async fn pause(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = token.cancelled() => true,
            _ = tokio::time::sleep(self.interval) => false,
        }
    }
}
