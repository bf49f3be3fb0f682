use crate::backend::{BackendInput, BackendOutput, InferenceBackend, InputMode};
use crate::error::ClassifierError;
use crate::prediction::PredictionResult;
use crate::preprocess::{ImageInput, Preprocessor};
use crate::vocabulary::ClassVocabulary;
use std::sync::Arc;
use tracing::debug;

/// `classify(image)` over one backend, fixed at construction.
pub struct PredictionService {
    backend: Box<dyn InferenceBackend>,
    preprocessor: Preprocessor,
    vocabulary: Arc<ClassVocabulary>,
}

impl PredictionService {
    pub fn new(
        backend: Box<dyn InferenceBackend>,
        preprocessor: Preprocessor,
        vocabulary: Arc<ClassVocabulary>,
    ) -> Self {
        Self {
            backend,
            preprocessor,
            vocabulary,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn vocabulary(&self) -> &ClassVocabulary {
        &self.vocabulary
    }

    pub fn classify(&self, image: &ImageInput) -> Result<PredictionResult, ClassifierError> {
        let output = match self.backend.input_mode() {
            InputMode::Tensor => {
                let tensor = self.preprocessor.preprocess(image)?;
                self.backend.infer(BackendInput::Tensor(&tensor))?
            }
            InputMode::Image => self.backend.infer(BackendInput::Image(image))?,
        };

        let result = match output {
            BackendOutput::Scores(scores) => PredictionResult::from_scores(scores, &self.vocabulary)?,
            BackendOutput::Decision {
                class_id,
                confidence,
                probabilities,
            } => PredictionResult::from_decision(class_id, confidence, probabilities, &self.vocabulary)?,
        };
        debug!(
            backend = self.backend.name(),
            class_id = result.class_id,
            label = %result.label,
            confidence = result.confidence,
            "classified"
        );
        Ok(result)
    }
}
