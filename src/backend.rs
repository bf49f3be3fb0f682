//! The seam between [`PredictionService`](crate::service::PredictionService) and
//! whatever actually runs the model.

use crate::error::ClassifierError;
use crate::prediction::ScoreVector;
use crate::preprocess::{ImageInput, NormalizedTensor};

/// What a backend wants to be handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// A tensor produced by the local preprocessor.
    Tensor,
    /// The untouched image; the backend preprocesses on its side.
    Image,
}

pub enum BackendInput<'a> {
    Tensor(&'a NormalizedTensor),
    Image(&'a ImageInput),
}

/// A backend either returns the full score vector or its own decision.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutput {
    Scores(ScoreVector),
    Decision {
        class_id: usize,
        confidence: f32,
        probabilities: Option<Vec<f32>>,
    },
}

pub trait InferenceBackend {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    fn input_mode(&self) -> InputMode;

    fn infer(&self, input: BackendInput<'_>) -> Result<BackendOutput, ClassifierError>;
}
