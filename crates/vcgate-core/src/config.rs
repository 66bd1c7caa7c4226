use std::time::Duration;

use vcgate_model::{
    DEFAULT_DIFFUSION_STEPS_CEILING, JobKind, MAX_QUEUE_TIME_CEILING, ModelKnobs, RouteConfig,
};

use crate::error::CoreError;

/// Tuning of the admission controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Conversions admitted and not yet finished (waiting plus executing).
    pub max_queue_depth: usize,
    /// Period of the deadline sweep that runs even without new arrivals.
    pub sweep_interval: Duration,
    /// Server-side ceiling for `diffusion_steps`.
    pub diffusion_steps_ceiling: u32,
    /// Route contract for conversions.
    pub conversion: RouteConfig,
    /// Route contract for health checks.
    pub health: RouteConfig,
    /// Fixed sampling knobs forwarded on every call.
    pub knobs: ModelKnobs,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: 16,
            sweep_interval: Duration::from_millis(250),
            diffusion_steps_ceiling: DEFAULT_DIFFUSION_STEPS_CEILING,
            conversion: RouteConfig::conversion(),
            health: RouteConfig::health(),
            knobs: ModelKnobs::default(),
        }
    }
}

impl ControllerConfig {
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    pub fn with_max_queue_time(mut self, max_queue_time: Duration) -> Self {
        self.conversion.max_queue_time = max_queue_time;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Route table in publication order.
    pub fn routes(&self) -> Vec<RouteConfig> {
        vec![self.conversion.clone(), self.health.clone()]
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_queue_depth == 0 {
            return Err(CoreError::InvalidConfig(
                "max_queue_depth must be at least 1".into(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "sweep_interval must be non-zero".into(),
            ));
        }
        if self.diffusion_steps_ceiling == 0 {
            return Err(CoreError::InvalidConfig(
                "diffusion_steps_ceiling must be at least 1".into(),
            ));
        }
        if self.conversion.kind != JobKind::Conversion || self.health.kind != JobKind::Health {
            return Err(CoreError::InvalidConfig("route kinds are swapped".into()));
        }
        for route in [&self.conversion, &self.health] {
            if route.kind.needs_slot() && route.allow_parallel {
                return Err(CoreError::InvalidConfig(format!(
                    "route {} runs on the single model slot and cannot allow parallel requests",
                    route.route
                )));
            }
            if route.max_queue_time > MAX_QUEUE_TIME_CEILING {
                return Err(CoreError::InvalidConfig(format!(
                    "route {} max_queue_time {:?} exceeds {:?}",
                    route.route, route.max_queue_time, MAX_QUEUE_TIME_CEILING
                )));
            }
        }
        if self.conversion.max_queue_time.is_zero() {
            return Err(CoreError::InvalidConfig(format!(
                "route {} needs a non-zero max_queue_time",
                self.conversion.route
            )));
        }
        Ok(())
    }
}
