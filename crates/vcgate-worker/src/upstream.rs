use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use vcgate_core::{Converter, ModelError};
use vcgate_model::{ConvertOutput, ConvertRequest, LogSignals};

/// Rate assumed when the model server answers with something other than RIFF/WAVE.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("model server request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model server answered {status}: {detail}")]
    Status { status: u16, detail: String },
}

impl UpstreamError {
    fn into_model_error(self) -> ModelError {
        match self {
            UpstreamError::Status { status, detail } if status == 503 => {
                ModelError::Fault(format!("model server not ready: {detail}"))
            }
            UpstreamError::Status { detail, .. } => ModelError::classify(detail),
            UpstreamError::Http(e) if e.is_timeout() => {
                ModelError::Fault(format!("model call timed out: {e}"))
            }
            UpstreamError::Http(e) => ModelError::Fault(format!("model server unreachable: {e}")),
        }
    }
}

/// Reply of the model server's `/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub models_loaded: bool,
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: String,
}

/// [`Converter`] backed by a Seed-VC model server over HTTP.
#[derive(Clone)]
pub struct UpstreamConverter {
    client: Client,
    base_url: String,
}

impl UpstreamConverter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<UpstreamHealth, UpstreamError> {
        let res = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let res = ensure_success(res).await?;
        Ok(res.json().await?)
    }

    async fn post_convert(&self, request: ConvertRequest) -> Result<ConvertOutput, UpstreamError> {
        let ConvertRequest {
            source_audio,
            target_audio,
            params,
            knobs,
        } = request;

        let form = Form::new()
            .part("source_audio", wav_part(source_audio, "source.wav"))
            .part("target_audio", wav_part(target_audio, "target.wav"))
            .text("diffusion_steps", params.diffusion_steps.to_string())
            .text("length_adjust", params.length_adjust.to_string())
            .text("convert_style", params.convert_style.to_string())
            .text(
                "intelligibility_cfg_rate",
                knobs.intelligibility_cfg_rate.to_string(),
            )
            .text("similarity_cfg_rate", knobs.similarity_cfg_rate.to_string())
            .text("top_p", knobs.top_p.to_string())
            .text("temperature", knobs.temperature.to_string())
            .text("repetition_penalty", knobs.repetition_penalty.to_string())
            .text("anonymization_only", knobs.anonymization_only.to_string());

        let res = self
            .client
            .post(format!("{}/convert", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let res = ensure_success(res).await?;

        let audio = res.bytes().await?.to_vec();
        let sample_rate = wav_sample_rate(&audio).unwrap_or_else(|| {
            debug!(bytes = audio.len(), "model reply is not RIFF/WAVE, assuming default rate");
            DEFAULT_SAMPLE_RATE
        });
        Ok(ConvertOutput { sample_rate, audio })
    }
}

#[async_trait]
impl Converter for UpstreamConverter {
    fn name(&self) -> &'static str {
        "seed-vc-http"
    }

    async fn convert(&self, request: ConvertRequest) -> Result<ConvertOutput, ModelError> {
        self.post_convert(request).await.map_err(|e| {
            let err = e.into_model_error();
            if err.is_resource_exhausted() {
                warn!("{} reported by model server", LogSignals::OUT_OF_MEMORY);
            }
            err
        })
    }
}

fn wav_part(bytes: Vec<u8>, file_name: &'static str) -> Part {
    Part::bytes(bytes).file_name(file_name)
}

async fn ensure_success(res: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        detail: error_detail(status, &body),
    })
}

/// FastAPI puts the message in `{"detail": ...}`; fall back to the raw body.
fn error_detail(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorDetail>(body) {
        return parsed.detail;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sample rate from a canonical RIFF/WAVE header (`fmt ` chunk first).
pub fn wav_sample_rate(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 28 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }
    let raw: [u8; 4] = bytes[24..28].try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method, path},
    };

    use super::*;

    fn wav(rate: u32) -> Vec<u8> {
        let mut h = Vec::with_capacity(44);
        h.extend_from_slice(b"RIFF");
        h.extend_from_slice(&36u32.to_le_bytes());
        h.extend_from_slice(b"WAVEfmt ");
        h.extend_from_slice(&16u32.to_le_bytes());
        h.extend_from_slice(&1u16.to_le_bytes());
        h.extend_from_slice(&1u16.to_le_bytes());
        h.extend_from_slice(&rate.to_le_bytes());
        h.extend_from_slice(&(rate * 2).to_le_bytes());
        h.extend_from_slice(&2u16.to_le_bytes());
        h.extend_from_slice(&16u16.to_le_bytes());
        h.extend_from_slice(b"data");
        h.extend_from_slice(&0u32.to_le_bytes());
        h
    }

    fn request() -> ConvertRequest {
        ConvertRequest::new(vec![1, 2], vec![3, 4], Default::default())
    }

    async fn converter(server: &MockServer) -> UpstreamConverter {
        UpstreamConverter::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn reads_rate_from_header() {
        assert_eq!(wav_sample_rate(&wav(44100)), Some(44100));
        assert_eq!(wav_sample_rate(b"ID3\x04mp3-data-not-a-wav-file"), None);
        assert_eq!(wav_sample_rate(b"RIFF"), None);
    }

    #[test]
    fn detail_prefers_fastapi_shape() {
        assert_eq!(
            error_detail(StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail":"boom"}"#),
            "boom"
        );
        assert_eq!(
            error_detail(StatusCode::BAD_GATEWAY, "  "),
            "502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn successful_conversion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/convert"))
            .and(body_string_contains("name=\"diffusion_steps\""))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(wav(24000)))
            .expect(1)
            .mount(&server)
            .await;

        let out = converter(&server).await.convert(request()).await.unwrap();
        assert_eq!(out.sample_rate, 24000);
        assert_eq!(out.audio, wav(24000));
    }

    #[tokio::test]
    async fn non_wav_reply_gets_default_rate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/convert"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raw-pcm".to_vec()))
            .mount(&server)
            .await;

        let out = converter(&server).await.convert(request()).await.unwrap();
        assert_eq!(out.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[tokio::test]
    async fn cuda_oom_is_resource_exhaustion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/convert"))
            .respond_with(ResponseTemplate::new(500).set_body_string(
                r#"{"detail":"CUDA out of memory. Tried to allocate 1.50 GiB"}"#,
            ))
            .mount(&server)
            .await;

        let err = converter(&server)
            .await
            .convert(request())
            .await
            .unwrap_err();
        assert!(err.is_resource_exhausted());
        assert!(err.to_string().contains("Tried to allocate"));
    }

    #[tokio::test]
    async fn other_failures_are_faults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/convert"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string(r#"{"detail":"Conversion returned no audio"}"#),
            )
            .mount(&server)
            .await;

        let err = converter(&server)
            .await
            .convert(request())
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::Fault("Conversion returned no audio".into()));
    }

    #[tokio::test]
    async fn health_reads_models_loaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":"healthy","models_loaded":true,"device":"cuda"}"#,
            ))
            .mount(&server)
            .await;

        let h = converter(&server).await.health().await.unwrap();
        assert!(h.models_loaded);
        assert_eq!(h.device.as_deref(), Some("cuda"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_fault() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let conv = UpstreamConverter::new(&uri, Duration::from_secs(2)).unwrap();
        let err = conv.convert(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::Fault(_)));
    }
}
