use std::time::Duration;

use thiserror::Error;
use vcgate_model::Readiness;

/// Substrings of model failure messages that mean the device ran out of capacity.
const EXHAUSTION_MARKERS: &[&str] = &["out of memory", "resource exhausted", "outofmemoryerror"];

/// Matched as a whole word only ("bloom" and "room" are not exhaustion).
const EXHAUSTION_WORD: &str = "oom";

/// Failure raised by the external model call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Capacity problem (device memory, allocator). Retrying elsewhere may help.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Anything else the model raised.
    #[error("model fault: {0}")]
    Fault(String),
}

impl ModelError {
    /// Builds a `ModelError` from a raw failure message, detecting exhaustion markers.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let marked = EXHAUSTION_MARKERS.iter().any(|m| lower.contains(m))
            || lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|word| word == EXHAUSTION_WORD);
        if marked {
            ModelError::ResourceExhausted(message)
        } else {
            ModelError::Fault(message)
        }
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, ModelError::ResourceExhausted(_))
    }

    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ModelError::ResourceExhausted(_) => "resource_exhausted",
            ModelError::Fault(_) => "fault",
        }
    }
}

/// Errors surfaced by the admission controller.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Readiness gate refused the job. Retry later.
    #[error("model is not ready")]
    NotReady,

    /// Admission rejected; the caller should back off or go elsewhere.
    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Job waited past its deadline and was never executed.
    #[error("job waited {waited:?} and exceeded its queue deadline")]
    QueueTimeout { waited: Duration },

    #[error("execution failed: {0}")]
    ExecutionFailed(#[from] ModelError),

    /// The single-slot guarantee was broken. The process must not continue.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error("illegal readiness transition {from} -> {to}")]
    InvalidTransition { from: Readiness, to: Readiness },

    #[error("invalid controller config: {0}")]
    InvalidConfig(String),

    #[error("controller is shutting down")]
    Shutdown,
}

impl CoreError {
    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CoreError::NotReady => "not_ready",
            CoreError::QueueFull { .. } => "queue_full",
            CoreError::QueueTimeout { .. } => "queue_timeout",
            CoreError::ExecutionFailed(_) => "execution_failed",
            CoreError::InternalInvariantViolation(_) => "invariant_violation",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::InvalidConfig(_) => "invalid_config",
            CoreError::Shutdown => "shutdown",
        }
    }

    /// Errors after which the process has to be restarted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::InternalInvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_detects_exhaustion() {
        let e = ModelError::classify("RuntimeError: CUDA out of memory. Tried to allocate 2.00 GiB");
        assert!(e.is_resource_exhausted());
        assert_eq!(e.as_label(), "resource_exhausted");

        let e = ModelError::classify("shape mismatch in decoder");
        assert!(!e.is_resource_exhausted());
        assert_eq!(e.as_label(), "fault");

        assert!(ModelError::classify("torch.OutOfMemoryError: allocation failed").is_resource_exhausted());
        assert!(ModelError::classify("worker killed (OOM)").is_resource_exhausted());
    }

    #[test]
    fn words_containing_oom_are_faults() {
        for msg in [
            "checkpoint not found: /models/bloom_decoder.pt",
            "no room left in the vocoder cache",
            "zoom factor must be positive",
        ] {
            assert_eq!(ModelError::classify(msg).as_label(), "fault", "{msg}");
        }
    }

    #[test]
    fn only_invariant_violations_are_fatal() {
        assert!(CoreError::InternalInvariantViolation("double acquire".into()).is_fatal());
        assert!(!CoreError::Shutdown.is_fatal());
        assert!(!CoreError::ExecutionFailed(ModelError::Fault("bug".into())).is_fatal());
    }
}
