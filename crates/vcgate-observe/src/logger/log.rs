use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError};

pub(crate) fn text(cfg: &LoggerConfig, filter: EnvFilter) -> Result<(), LoggerError> {
    let layer = fmt::layer()
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets)
        .with_timer(local_timer());
    install(tracing_subscriber::registry().with(filter).with(layer))
}

pub(crate) fn json(cfg: &LoggerConfig, filter: EnvFilter) -> Result<(), LoggerError> {
    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_target(cfg.with_targets)
        .with_current_span(true)
        .with_timer(local_timer());
    install(tracing_subscriber::registry().with(filter).with(layer))
}

#[cfg(all(target_os = "linux", feature = "journald"))]
pub(crate) fn journald(filter: EnvFilter) -> Result<(), LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("vcgate".to_string());
    install(tracing_subscriber::registry().with(filter).with(layer))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
pub(crate) fn journald(_filter: EnvFilter) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

pub(crate) fn filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

/// RFC 3339 timestamps in the host's offset, UTC when it cannot be read.
fn local_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn install<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|e| {
        let msg = e.to_string();
        if msg.contains("SetGlobalDefaultError") || msg.contains("global default") {
            LoggerError::AlreadyInitialized
        } else {
            LoggerError::InitializationFailed(msg)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LoggerFormat, logger_init};

    #[test]
    fn accepts_directive_lists() {
        assert!(filter("vcgate_core=debug,info").is_ok());
    }

    #[test]
    fn rejects_garbage_filter() {
        assert!(matches!(
            filter("vcgate_core=loud"),
            Err(LoggerError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn second_init_fails() {
        let cfg = LoggerConfig {
            format: LoggerFormat::Text,
            use_color: false,
            ..LoggerConfig::default()
        };
        let _ = logger_init(&cfg);
        assert!(logger_init(&cfg).is_err());
    }

    #[cfg(not(all(target_os = "linux", feature = "journald")))]
    #[test]
    fn journald_without_backend_is_refused() {
        let res = journald(filter("info").unwrap());
        assert!(matches!(res, Err(LoggerError::JournaldNotSupported)));
    }
}
