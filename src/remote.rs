//! Client for a deployed copy of the classifier behind `POST {base}/predict`.
//!
//! One call is one request. Retrying belongs to the caller so that recorded
//! latencies always describe a single exchange.

use crate::backend::{BackendInput, BackendOutput, InferenceBackend, InputMode};
use crate::error::ClassifierError;
use crate::preprocess::{ImageInput, NormalizedTensor};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How the payload is shipped to the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadMode {
    /// Raw image bytes as a `multipart/form-data` `file` part; the server preprocesses.
    #[default]
    Multipart,
    /// A JSON tensor built by the local preprocessor.
    Tensor,
}

#[derive(Debug, Clone)]
pub struct RemoteOptions {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub payload: PayloadMode,
}

impl RemoteOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            payload: PayloadMode::default(),
        }
    }
}

/// Body of a successful prediction.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PredictResponse {
    pub class_id: i64,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

/// Tensor payload for deployments that expect preprocessed input.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TensorPayload {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorPayload {
    pub fn from_tensor(tensor: &NormalizedTensor) -> Self {
        let [c, h, w] = tensor.shape();
        Self {
            shape: vec![1, c, h, w],
            data: tensor.as_array().iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.model_loaded
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

pub struct RemoteClient {
    http: Client,
    options: RemoteOptions,
}

impl RemoteClient {
    pub fn new(options: RemoteOptions) -> Result<Self, ClassifierError> {
        if !(options.base_url.starts_with("http://") || options.base_url.starts_with("https://")) {
            return Err(ClassifierError::Config(format!(
                "endpoint must be an http(s) URL, got {:?}",
                options.base_url
            )));
        }
        let http = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| ClassifierError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { http, options })
    }

    pub fn options(&self) -> &RemoteOptions {
        &self.options
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.options.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.options.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Uploads an image as `multipart/form-data`.
    pub fn predict_image(&self, image: &ImageInput) -> Result<PredictResponse, ClassifierError> {
        let bytes = image.upload_bytes()?;
        let part = multipart::Part::bytes(bytes).file_name(image.file_name().to_string());
        let form = multipart::Form::new().part("file", part);
        let request = self.authorized(self.http.post(self.url("predict"))).multipart(form);
        self.send(request)
    }

    /// Posts a preprocessed tensor as JSON.
    pub fn predict_tensor(
        &self,
        tensor: &NormalizedTensor,
    ) -> Result<PredictResponse, ClassifierError> {
        let payload = TensorPayload::from_tensor(tensor);
        let request = self.authorized(self.http.post(self.url("predict"))).json(&payload);
        self.send(request)
    }

    pub fn health(&self) -> Result<HealthStatus, ClassifierError> {
        let response = self
            .authorized(self.http.get(self.url("health")))
            .send()
            .map_err(|e| self.transport_error(e))?;
        let response = self.check_status(response)?;
        self.parse_body(response)
    }

    fn send(&self, request: RequestBuilder) -> Result<PredictResponse, ClassifierError> {
        let response = request.send().map_err(|e| self.transport_error(e))?;
        debug!(status = %response.status(), "prediction response");
        let response = self.check_status(response)?;
        let body: PredictResponse = self.parse_body(response)?;
        if !(0.0..=1.0).contains(&body.confidence) {
            return Err(ClassifierError::MalformedResponse(format!(
                "confidence {} outside [0, 1]",
                body.confidence
            )));
        }
        Ok(body)
    }

    fn transport_error(&self, err: reqwest::Error) -> ClassifierError {
        if err.is_timeout() {
            ClassifierError::Timeout(self.options.timeout)
        } else {
            ClassifierError::Network(err.to_string())
        }
    }

    /// Reads the whole body. The client timeout also covers this read.
    fn read_body(&self, response: Response) -> Result<String, ClassifierError> {
        response.text().map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout(self.options.timeout)
            } else {
                ClassifierError::MalformedResponse(format!("unreadable body: {e}"))
            }
        })
    }

    fn check_status(&self, response: Response) -> Result<Response, ClassifierError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = match self.read_body(response) {
            Ok(text) => text,
            Err(ClassifierError::MalformedResponse(_)) => String::new(),
            Err(err) => return Err(err),
        };
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.detail)
            .unwrap_or(text);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClassifierError::Auth {
                status: status.as_u16(),
                message,
            }),
            _ => Err(ClassifierError::Server {
                status: status.as_u16(),
                body: message,
            }),
        }
    }

    fn parse_body<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ClassifierError> {
        let text = self.read_body(response)?;
        serde_json::from_str(&text).map_err(|e| {
            ClassifierError::MalformedResponse(format!("{e}: {}", truncate(&text, 200)))
        })
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl InferenceBackend for RemoteClient {
    fn name(&self) -> &str {
        "remote-http"
    }

    fn input_mode(&self) -> InputMode {
        match self.options.payload {
            PayloadMode::Multipart => InputMode::Image,
            PayloadMode::Tensor => InputMode::Tensor,
        }
    }

    fn infer(&self, input: BackendInput<'_>) -> Result<BackendOutput, ClassifierError> {
        let response = match input {
            BackendInput::Image(image) => self.predict_image(image)?,
            BackendInput::Tensor(tensor) => self.predict_tensor(tensor)?,
        };
        let class_id = usize::try_from(response.class_id).map_err(|_| {
            ClassifierError::MalformedResponse(format!("negative class_id {}", response.class_id))
        })?;
        Ok(BackendOutput::Decision {
            class_id,
            confidence: response.confidence,
            probabilities: response.probabilities,
        })
    }
}
