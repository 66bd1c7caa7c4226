use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::Field},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use vcgate_model::{ConvertParams, ConvertRequest};

use crate::{error::ApiError, handler::ApiHandler};

/// Uploads larger than this are refused before they reach the controller.
const DEFAULT_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
    body_limit: usize,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Build the axum router.
    ///
    /// Routes:
    /// - POST /convert - multipart conversion, replies with `audio/wav`
    /// - GET /health - liveness and readiness, always 200
    /// - GET /status - load snapshot for the autoscaler
    /// - GET /manifest - route table and log signals
    /// - GET /metrics - Prometheus text, 404 when not exported
    pub fn router(self) -> Router {
        Router::new()
            .route("/convert", post(convert::<H>))
            .route("/health", get(health::<H>))
            .route("/status", get(status::<H>))
            .route("/manifest", get(manifest::<H>))
            .route("/metrics", get(metrics::<H>))
            .layer(DefaultBodyLimit::max(self.body_limit))
            .layer(cors())
            .with_state(self.handler)
    }
}

/// POST /convert
async fn convert<H>(
    State(handler): State<Arc<H>>,
    multipart: Multipart,
) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    let request = read_convert_form(multipart).await?;
    let done = handler.convert(request).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"converted.wav\""),
    );
    headers.insert("x-sample-rate", HeaderValue::from(done.output.sample_rate));
    headers.insert(
        "x-job-id",
        HeaderValue::from_str(done.job_id.as_str())
            .map_err(|e| ApiError::Internal(format!("job id header: {e}")))?,
    );
    Ok((StatusCode::OK, headers, done.output.audio).into_response())
}

/// GET /health
async fn health<H>(State(handler): State<Arc<H>>) -> impl IntoResponse
where
    H: ApiHandler,
{
    Json(handler.health())
}

/// GET /status
async fn status<H>(State(handler): State<Arc<H>>) -> impl IntoResponse
where
    H: ApiHandler,
{
    Json(handler.status())
}

/// GET /manifest
async fn manifest<H>(State(handler): State<Arc<H>>) -> impl IntoResponse
where
    H: ApiHandler,
{
    Json(handler.manifest())
}

/// GET /metrics
async fn metrics<H>(State(handler): State<Arc<H>>) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    Ok(match handler.metrics()? {
        Some(text) => (
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            text,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

async fn read_convert_form(mut multipart: Multipart) -> Result<ConvertRequest, ApiError> {
    let mut source = None;
    let mut target = None;
    let mut params = ConvertParams::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "source_audio" => source = Some(read_bytes(field, &name).await?),
            "target_audio" => target = Some(read_bytes(field, &name).await?),
            "diffusion_steps" => {
                params.diffusion_steps = parse_field(&read_text(field, &name).await?, &name)?
            }
            "length_adjust" => {
                params.length_adjust = parse_field(&read_text(field, &name).await?, &name)?
            }
            "convert_style" => params.convert_style = parse_flag(&read_text(field, &name).await?)?,
            _ => {}
        }
    }

    let source = source
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("source_audio is required".into()))?;
    let target = target
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("target_audio is required".into()))?;
    if params.diffusion_steps == 0 {
        return Err(ApiError::InvalidRequest(
            "diffusion_steps must be at least 1".into(),
        ));
    }
    if !params.length_adjust.is_finite() || params.length_adjust <= 0.0 {
        return Err(ApiError::InvalidRequest(
            "length_adjust must be a positive number".into(),
        ));
    }

    Ok(ConvertRequest::new(source, target, params))
}

async fn read_bytes(field: Field<'_>, name: &str) -> Result<Vec<u8>, ApiError> {
    field
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| ApiError::InvalidRequest(format!("{name}: {e}")))
}

async fn read_text(field: Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("{name}: {e}")))
}

fn parse_field<T>(raw: &str, name: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::InvalidRequest(format!("{name}: {e}")))
}

fn parse_flag(raw: &str) -> Result<bool, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ApiError::InvalidRequest(format!(
            "convert_style: expected a boolean, got {other:?}"
        ))),
    }
}

/// Any origin, method and header; the conversion headers are readable by browsers.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static("x-sample-rate"),
            HeaderName::from_static("x-job-id"),
            header::CONTENT_DISPOSITION,
        ])
}
