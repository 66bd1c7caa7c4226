use serde::Serialize;
use thiserror::Error;
use vcgate_core::CoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Wire shape of every failed response.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

impl ApiError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) => 400,
            ApiError::Internal(_) => 500,
            ApiError::Core(e) => match e {
                CoreError::NotReady | CoreError::Shutdown => 503,
                CoreError::QueueFull { .. } => 429,
                CoreError::QueueTimeout { .. } => 504,
                CoreError::ExecutionFailed(_)
                | CoreError::InternalInvariantViolation(_)
                | CoreError::InvalidTransition { .. }
                | CoreError::InvalidConfig(_) => 500,
            },
        }
    }

    /// Machine-readable error kind; model failures report their cause.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Internal(_) => "internal",
            ApiError::Core(CoreError::ExecutionFailed(cause)) => cause.as_label(),
            ApiError::Core(e) => e.as_label(),
        }
    }

    pub(crate) fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            detail: self.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), kind = self.kind(), "{self}");
        }
        (status, axum::Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vcgate_core::ModelError;

    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (CoreError::NotReady, 503, "not_ready"),
            (CoreError::QueueFull { capacity: 4 }, 429, "queue_full"),
            (
                CoreError::QueueTimeout {
                    waited: Duration::from_secs(300),
                },
                504,
                "queue_timeout",
            ),
            (
                CoreError::ExecutionFailed(ModelError::classify("CUDA out of memory")),
                500,
                "resource_exhausted",
            ),
            (
                CoreError::ExecutionFailed(ModelError::Fault("shape mismatch".into())),
                500,
                "fault",
            ),
        ];
        for (err, status, kind) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status_code(), status);
            assert_eq!(api.kind(), kind);
        }
    }

    #[test]
    fn invalid_request_is_client_error() {
        let e = ApiError::InvalidRequest("source_audio is required".into());
        assert_eq!(e.status_code(), 400);
        assert_eq!(e.body().detail, "invalid request: source_audio is required");
    }
}
