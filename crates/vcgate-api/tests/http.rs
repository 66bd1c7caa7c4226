use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use vcgate_api::{ControllerAdapter, HttpApi};
use vcgate_core::{Controller, ControllerConfig, Converter, ModelError};
use vcgate_model::{ConvertOutput, ConvertRequest};

const BOUNDARY: &str = "vcgate-test-boundary";

/// Echoes the source audio back; `oom` in the target triggers an out-of-memory failure.
#[derive(Default)]
struct Echo {
    gate: Option<Semaphore>,
    steps: Mutex<Vec<u32>>,
}

#[async_trait]
impl Converter for Echo {
    async fn convert(&self, request: ConvertRequest) -> Result<ConvertOutput, ModelError> {
        self.steps.lock().unwrap().push(request.params.diffusion_steps);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if request.target_audio == b"oom" {
            return Err(ModelError::classify("CUDA out of memory"));
        }
        Ok(ConvertOutput {
            sample_rate: 22050,
            audio: request.source_audio,
        })
    }
}

struct App {
    router: Router,
    controller: Arc<Controller>,
    echo: Arc<Echo>,
    _token: CancellationToken,
}

fn app_with(cfg: ControllerConfig, echo: Echo, ready: bool) -> App {
    let echo = Arc::new(echo);
    let controller = Controller::new(cfg, Arc::clone(&echo) as Arc<dyn Converter>).unwrap();
    if ready {
        controller.lifecycle().mark_ready().unwrap();
    }
    let token = CancellationToken::new();
    controller.spawn_background(token.clone());

    let adapter = ControllerAdapter::new(Arc::clone(&controller), "worker-test");
    App {
        router: HttpApi::new(Arc::new(adapter)).router(),
        controller,
        echo,
        _token: token,
    }
}

fn app(ready: bool) -> App {
    app_with(ControllerConfig::default(), Echo::default(), ready)
}

enum Part<'a> {
    File(&'a str, &'a [u8]),
    Text(&'a str, &'a str),
}

fn convert_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json(res: Response<Body>) -> Value {
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_answered_while_loading() {
    let app = app(false);
    let res = app.router.oneshot(get("/health")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let body = json(res).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ready"], false);
    assert_eq!(body["readiness"], "loading");
}

#[tokio::test]
async fn convert_while_loading_is_503() {
    let app = app(false);
    let req = convert_request(&[
        Part::File("source_audio", b"src"),
        Part::File("target_audio", b"ref"),
    ]);
    let res = app.router.oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(res).await["error"], "not_ready");
}

#[tokio::test]
async fn convert_returns_wav_with_headers() {
    let app = app(true);
    let req = convert_request(&[
        Part::File("source_audio", b"RIFF-source"),
        Part::File("target_audio", b"RIFF-target"),
        Part::Text("diffusion_steps", "999"),
        Part::Text("length_adjust", "1.1"),
        Part::Text("convert_style", "false"),
    ]);
    let res = app.router.oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(headers["x-sample-rate"], "22050");
    assert!(!headers["x-job-id"].is_empty());
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"converted.wav\""
    );

    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"RIFF-source");
    assert_eq!(*app.echo.steps.lock().unwrap(), vec![50]);
}

#[tokio::test]
async fn missing_reference_is_400() {
    let app = app(true);
    let req = convert_request(&[Part::File("source_audio", b"src")]);
    let res = app.router.oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = json(res).await;
    assert_eq!(body["error"], "invalid_request");
    assert!(body["detail"].as_str().unwrap().contains("target_audio"));
}

#[tokio::test]
async fn bad_number_is_400() {
    let app = app(true);
    let req = convert_request(&[
        Part::File("source_audio", b"src"),
        Part::File("target_audio", b"ref"),
        Part::Text("diffusion_steps", "many"),
    ]);
    let res = app.router.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn out_of_memory_is_reported_as_exhaustion() {
    let app = app(true);
    let req = convert_request(&[
        Part::File("source_audio", b"src"),
        Part::File("target_audio", b"oom"),
    ]);
    let res = app.router.oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(res).await["error"], "resource_exhausted");
    assert!(!app.controller.report().in_flight);
}

#[tokio::test]
async fn full_queue_is_429() {
    let echo = Echo {
        gate: Some(Semaphore::new(0)),
        ..Default::default()
    };
    let app = app_with(ControllerConfig::default().with_max_queue_depth(1), echo, true);

    let first = {
        let router = app.router.clone();
        tokio::spawn(async move {
            router
                .oneshot(convert_request(&[
                    Part::File("source_audio", b"one"),
                    Part::File("target_audio", b"ref"),
                ]))
                .await
                .unwrap()
        })
    };
    for _ in 0..1000 {
        if app.controller.report().in_flight {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(app.controller.report().in_flight);

    let res = app
        .router
        .clone()
        .oneshot(convert_request(&[
            Part::File("source_audio", b"two"),
            Part::File("target_audio", b"ref"),
        ]))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json(res).await["error"], "queue_full");

    if let Some(gate) = &app.echo.gate {
        gate.add_permits(1);
    }
    assert_eq!(first.await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn status_reports_load_and_weights() {
    let app = app(true);
    let res = app.router.oneshot(get("/status")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res).await;
    assert_eq!(body["ready"], true);
    assert_eq!(body["in_flight"], false);
    assert_eq!(body["queue_depth"], 0);
    assert!(body["uptime_seconds"].is_u64());
    assert_eq!(body["readiness"], "ready");
    assert_eq!(body["workloads"]["conversion"], 100.0);
    assert_eq!(body["workloads"]["health"], 1.0);
}

#[tokio::test]
async fn manifest_publishes_routes_and_signals() {
    let app = app(false);
    let body = json(app.router.oneshot(get("/manifest")).await.unwrap()).await;

    assert_eq!(body["workerId"], "worker-test");
    assert_eq!(body["routes"][0]["route"], "/convert");
    assert_eq!(body["routes"][0]["allowParallel"], false);
    assert_eq!(body["routes"][0]["maxQueueTime"], 300.0);
    assert_eq!(body["routes"][1]["route"], "/health");
    assert!(
        body["logSignals"]["onLoad"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s == "Models loaded successfully")
    );
}

#[tokio::test]
async fn metrics_404_without_exporter() {
    let app = app(true);
    let res = app.router.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_served_from_exporter() {
    let controller = Controller::new(ControllerConfig::default(), Arc::new(Echo::default())).unwrap();
    let adapter = ControllerAdapter::new(controller, "w")
        .with_exporter(Arc::new(|| Ok("vcgate_in_flight 0\n".to_string())));
    let router = HttpApi::new(Arc::new(adapter)).router();

    let res = router.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"vcgate_in_flight 0\n");
}

#[tokio::test]
async fn preflight_is_allowed() {
    let app = app(true);
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/convert")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let res = app.router.oneshot(req).await.unwrap();

    assert!(res.status().is_success());
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(res.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn cross_origin_reply_exposes_conversion_headers() {
    let app = app(true);
    let req = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let res = app.router.oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let exposed = res.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    for name in ["x-sample-rate", "x-job-id", "content-disposition"] {
        assert!(exposed.contains(name), "{name} not exposed: {exposed}");
    }
}
