#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use classifier_parity::{
    BackendInput, BackendOutput, ClassVocabulary, ClassifierError, InferenceBackend, InputMode,
    PredictionService, Preprocessor, ScoreVector,
};
use image::{Rgb, RgbImage};
use serde_json::json;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// What the stub deployment answers on `/predict`.
#[derive(Debug, Clone)]
pub enum Reply {
    Prediction { class_id: i64, confidence: f32 },
    Status { code: u16, detail: String },
    Raw(String),
}

#[derive(Debug, Clone)]
pub struct StubConfig {
    pub api_key: Option<String>,
    pub delay: Duration,
    pub reply: Reply,
}

impl StubConfig {
    pub fn predicting(class_id: i64, confidence: f32) -> Self {
        Self {
            api_key: Some("test_api_key".to_string()),
            delay: Duration::ZERO,
            reply: Reply::Prediction {
                class_id,
                confidence,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub content_type: String,
    pub authorization: Option<String>,
    pub body_len: usize,
}

struct StubState {
    config: StubConfig,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// An HTTP deployment double served on its own tokio runtime.
pub struct StubDeployment {
    pub url: String,
    state: Arc<StubState>,
    _runtime: tokio::runtime::Runtime,
}

impl StubDeployment {
    pub fn start(config: StubConfig) -> Self {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let state = Arc::new(StubState {
            config,
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/predict", post(predict))
            .route("/health", get(health))
            .with_state(state.clone());
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();
        runtime.spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            url: format!("http://{addr}"),
            state,
            _runtime: runtime,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn health(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Json<serde_json::Value> {
    state.requests.lock().unwrap().push(RecordedRequest {
        content_type: String::new(),
        authorization: header_str(&headers, header::AUTHORIZATION),
        body_len: 0,
    });
    Json(json!({"status": "healthy", "model_loaded": true}))
}

async fn predict(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = header_str(&headers, header::AUTHORIZATION);
    state.requests.lock().unwrap().push(RecordedRequest {
        content_type: header_str(&headers, header::CONTENT_TYPE).unwrap_or_default(),
        authorization: authorization.clone(),
        body_len: body.len(),
    });

    let config = &state.config;
    if let Some(key) = &config.api_key {
        let detail = match authorization {
            None => Some("API key is required"),
            Some(a) if a != format!("Bearer {key}") => Some("Invalid API key"),
            Some(_) => None,
        };
        if let Some(detail) = detail {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail }))).into_response();
        }
    }
    if !config.delay.is_zero() {
        tokio::time::sleep(config.delay).await;
    }
    match &config.reply {
        Reply::Prediction {
            class_id,
            confidence,
        } => Json(json!({
            "class_id": class_id,
            "confidence": confidence,
            "filename": "upload",
            "processing_time": 0.01,
        }))
        .into_response(),
        Reply::Status { code, detail } => (
            StatusCode::from_u16(*code).unwrap(),
            Json(json!({ "detail": detail })),
        )
            .into_response(),
        Reply::Raw(text) => (StatusCode::OK, text.clone()).into_response(),
    }
}

/// A server that answers one request with `status_line` and the first byte of
/// a JSON body, then stalls for `stall` before closing. Returns its base URL.
pub fn stalling_server(status_line: &'static str, stall: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let head = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{{"
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.flush();
        thread::sleep(stall);
    });
    format!("http://{addr}")
}

/// Local stand-in for the ONNX engine: red-dominant images are class 0
/// (tench), everything else class 35 (mud turtle).
pub struct ColorBackend;

impl InferenceBackend for ColorBackend {
    fn name(&self) -> &str {
        "color-fake"
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Tensor
    }

    fn infer(&self, input: BackendInput<'_>) -> Result<BackendOutput, ClassifierError> {
        let BackendInput::Tensor(tensor) = input else {
            return Err(ClassifierError::Config("tensor expected".to_string()));
        };
        let array = tensor.as_array();
        let red = array.index_axis(ndarray::Axis(0), 0).mean().unwrap_or(0.0);
        let blue = array.index_axis(ndarray::Axis(0), 2).mean().unwrap_or(0.0);
        let mut logits = vec![0.0; 1000];
        logits[if red > blue { 0 } else { 35 }] = 10.0;
        Ok(BackendOutput::Scores(ScoreVector::logits(logits)))
    }
}

pub fn service(backend: Box<dyn InferenceBackend>) -> PredictionService {
    PredictionService::new(
        backend,
        Preprocessor::default(),
        Arc::new(ClassVocabulary::imagenet()),
    )
}

pub fn write_png(path: &Path, px: [u8; 3], width: u32, height: u32) -> PathBuf {
    RgbImage::from_pixel(width, height, Rgb(px)).save(path).unwrap();
    path.to_path_buf()
}

/// A red "tench" (class 0) and a blue "mud turtle" (class 35) plus a manifest.
pub fn write_fixture_dir(dir: &Path) -> PathBuf {
    write_png(&dir.join("red.png"), [220, 30, 30], 320, 240);
    write_png(&dir.join("blue.png"), [30, 30, 220], 200, 300);
    let manifest = dir.join("manifest.json");
    std::fs::write(
        &manifest,
        r#"{"fixtures": [
            {"name": "tench", "image": "red.png", "expected_class_id": 0},
            {"name": "mud_turtle", "image": "blue.png", "expected_class_id": 35}
        ]}"#,
    )
    .unwrap();
    manifest
}
