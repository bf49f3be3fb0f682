use ort::error::Error as OrtError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ClassifierError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Tensor shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("Failed to load model {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] OrtError),
    #[error("Credentials rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("Server returned HTTP {status}: {body}")]
    Server { status: u16, body: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Class vocabulary error: {0}")]
    Vocabulary(String),
    #[error("Fixture error: {0}")]
    Fixture(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable tag for each failure class, as written into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "InvalidImageError")]
    InvalidImage,
    #[serde(rename = "ShapeMismatchError")]
    ShapeMismatch,
    #[serde(rename = "ModelLoadError")]
    ModelLoad,
    #[serde(rename = "RuntimeError")]
    Runtime,
    #[serde(rename = "AuthError")]
    Auth,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "ServerError")]
    Server,
    #[serde(rename = "MalformedResponseError")]
    MalformedResponse,
    #[serde(rename = "NetworkError")]
    Network,
    #[serde(rename = "VocabularyError")]
    Vocabulary,
    #[serde(rename = "FixtureError")]
    Fixture,
    #[serde(rename = "ConfigError")]
    Config,
    #[serde(rename = "IoError")]
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidImage => "InvalidImageError",
            ErrorKind::ShapeMismatch => "ShapeMismatchError",
            ErrorKind::ModelLoad => "ModelLoadError",
            ErrorKind::Runtime => "RuntimeError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Server => "ServerError",
            ErrorKind::MalformedResponse => "MalformedResponseError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Vocabulary => "VocabularyError",
            ErrorKind::Fixture => "FixtureError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Io => "IoError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClassifierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifierError::InvalidImage(_) | ClassifierError::ImageProcessing(_) => {
                ErrorKind::InvalidImage
            }
            ClassifierError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            ClassifierError::ModelLoad { .. } => ErrorKind::ModelLoad,
            ClassifierError::Ort(_) => ErrorKind::Runtime,
            ClassifierError::Auth { .. } => ErrorKind::Auth,
            ClassifierError::Timeout(_) => ErrorKind::Timeout,
            ClassifierError::Server { .. } => ErrorKind::Server,
            ClassifierError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ClassifierError::Network(_) => ErrorKind::Network,
            ClassifierError::Vocabulary(_) => ErrorKind::Vocabulary,
            ClassifierError::Fixture(_) => ErrorKind::Fixture,
            ClassifierError::Config(_) | ClassifierError::Json(_) => ErrorKind::Config,
            ClassifierError::Io(_) => ErrorKind::Io,
        }
    }

    /// Transport failures that a harness-level retry may reasonably repeat.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::Network
        )
    }
}
