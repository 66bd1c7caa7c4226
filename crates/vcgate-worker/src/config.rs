use std::{net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;
use vcgate_core::{ControllerConfig, CoreError};
use vcgate_observe::{LoggerConfig, LoggerError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Controller(#[from] CoreError),
    #[error(transparent)]
    Logger(#[from] LoggerError),
}

/// Worker settings, read from `VCGATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address the HTTP API listens on.
    pub bind: SocketAddr,
    /// Base URL of the model server.
    pub model_url: String,
    /// Upper bound for one upstream conversion call.
    pub request_timeout: Duration,
    /// Readiness poll period.
    pub probe_interval: Duration,
    /// Time the model gets to finish loading before the worker gives up.
    pub load_timeout: Duration,
    /// Consecutive failed polls after Ready that mark the model failed.
    pub probe_failure_threshold: u32,
    pub controller: ControllerConfig,
    pub logger: LoggerConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            model_url: "http://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(600),
            probe_interval: Duration::from_secs(1),
            load_timeout: Duration::from_secs(900),
            probe_failure_threshold: 5,
            controller: ControllerConfig::default(),
            logger: LoggerConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("VCGATE_BIND") {
            cfg.bind = parse("VCGATE_BIND", &v)?;
        }
        if let Some(v) = get("VCGATE_MODEL_URL") {
            cfg.model_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = get("VCGATE_REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = secs("VCGATE_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("VCGATE_PROBE_INTERVAL_MS") {
            cfg.probe_interval = Duration::from_millis(parse("VCGATE_PROBE_INTERVAL_MS", &v)?);
        }
        if let Some(v) = get("VCGATE_LOAD_TIMEOUT_SECS") {
            cfg.load_timeout = secs("VCGATE_LOAD_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("VCGATE_PROBE_FAILURES") {
            cfg.probe_failure_threshold = parse("VCGATE_PROBE_FAILURES", &v)?;
        }

        let ctl = &mut cfg.controller;
        if let Some(v) = get("VCGATE_MAX_QUEUE_DEPTH") {
            ctl.max_queue_depth = parse("VCGATE_MAX_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = get("VCGATE_MAX_QUEUE_TIME_SECS") {
            ctl.conversion.max_queue_time = secs("VCGATE_MAX_QUEUE_TIME_SECS", &v)?;
        }
        if let Some(v) = get("VCGATE_CONVERSION_WORKLOAD") {
            ctl.conversion.workload = parse("VCGATE_CONVERSION_WORKLOAD", &v)?;
        }
        if let Some(v) = get("VCGATE_SWEEP_INTERVAL_MS") {
            ctl.sweep_interval = Duration::from_millis(parse("VCGATE_SWEEP_INTERVAL_MS", &v)?);
        }
        if let Some(v) = get("VCGATE_DIFFUSION_STEPS_CEILING") {
            ctl.diffusion_steps_ceiling = parse("VCGATE_DIFFUSION_STEPS_CEILING", &v)?;
        }

        cfg.logger = LoggerConfig::parse(
            get("VCGATE_LOG_FORMAT").as_deref(),
            get("VCGATE_LOG_LEVEL").or_else(|| get("RUST_LOG")).as_deref(),
        )?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.model_url.starts_with("http://") || self.model_url.starts_with("https://")) {
            return Err(invalid(
                "VCGATE_MODEL_URL",
                &self.model_url,
                "expected an http(s) URL",
            ));
        }
        if self.probe_interval.is_zero() {
            return Err(invalid("VCGATE_PROBE_INTERVAL_MS", "0", "must be non-zero"));
        }
        if self.probe_failure_threshold == 0 {
            return Err(invalid("VCGATE_PROBE_FAILURES", "0", "must be at least 1"));
        }
        if self.load_timeout < self.probe_interval {
            return Err(invalid(
                "VCGATE_LOAD_TIMEOUT_SECS",
                &format!("{:?}", self.load_timeout),
                "must be at least one probe interval",
            ));
        }
        self.controller.validate()?;
        Ok(())
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, raw, &e.to_string()))
}

fn secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let value: f64 = parse(key, raw)?;
    Duration::try_from_secs_f64(value).map_err(|e| invalid(key, raw, &e.to_string()))
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
