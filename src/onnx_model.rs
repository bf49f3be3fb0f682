use crate::backend::{BackendInput, BackendOutput, InferenceBackend, InputMode};
use crate::error::ClassifierError;
use crate::model_config::{INPUT_CHANNELS, INPUT_SIZE, NUM_CLASSES, ScoreKind};
use crate::prediction::ScoreVector;
use crate::preprocess::NormalizedTensor;
use ndarray::{ArrayD, Axis};
use ort::error::Error as OrtError;
use ort::inputs;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionOutputs};
use ort::value::ValueType;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Whether the graph ends in logits or already-normalized probabilities.
    pub score_kind: ScoreKind,
    pub intra_threads: usize,
    /// 0 disables graph optimization, 3 enables all of it.
    pub optimization_level: u8,
    pub num_classes: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            score_kind: ScoreKind::Logits,
            intra_threads: num_cpus::get(),
            optimization_level: 3,
            num_classes: NUM_CLASSES,
        }
    }
}

/// A loaded ONNX classifier. Loaded once, then used read-only.
pub struct OnnxEngine {
    session: Session,
    model_path: PathBuf,
    input_name: String,
    output_name: String,
    input_shape: [usize; 3],
    options: EngineOptions,
}

impl OnnxEngine {
    pub fn load(model_path: &Path, options: EngineOptions) -> Result<Self, ClassifierError> {
        let load_error = |reason: String| ClassifierError::ModelLoad {
            path: model_path.to_path_buf(),
            reason,
        };

        if !model_path.is_file() {
            return Err(load_error("model file not found".to_string()));
        }

        info!(path = %model_path.display(), threads = options.intra_threads, "loading ONNX model");
        let session =
            build_session(model_path, &options).map_err(|e| load_error(e.to_string()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| load_error("graph declares no inputs".to_string()))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| load_error("graph declares no outputs".to_string()))?;

        let input_shape = declared_input_shape(&input.input_type).map_err(load_error)?;
        if let ValueType::Tensor { dimensions, .. } = &output.output_type {
            if let Some(&last) = dimensions.last() {
                if last > 0 && last as usize != options.num_classes {
                    return Err(load_error(format!(
                        "output declares {last} classes, expected {}",
                        options.num_classes
                    )));
                }
            }
        }

        let input_name = input.name.clone();
        let output_name = output.name.clone();
        info!(
            input = %input_name,
            output = %output_name,
            shape = ?input_shape,
            scores = ?options.score_kind,
            "ONNX Runtime session created"
        );

        Ok(Self {
            session,
            model_path: model_path.to_path_buf(),
            input_name,
            output_name,
            input_shape,
            options,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    pub fn score_kind(&self) -> ScoreKind {
        self.options.score_kind
    }

    pub fn predict(&self, tensor: &NormalizedTensor) -> Result<ScoreVector, ClassifierError> {
        check_input_shape(self.input_shape, tensor)?;

        // Shape [1, C, H, W]
        let batch: ArrayD<f32> = tensor.as_array().clone().insert_axis(Axis(0)).into_dyn();
        let inputs = inputs![self.input_name.as_str() => batch.view()]?;
        let outputs: SessionOutputs = self.session.run(inputs)?;

        let output_value = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ClassifierError::MalformedResponse(format!("no output named {}", self.output_name))
        })?;
        let scores_view = output_value.try_extract_tensor::<f32>()?;
        let values: Vec<f32> = scores_view.iter().copied().collect();
        if values.len() != self.options.num_classes {
            return Err(ClassifierError::ShapeMismatch {
                what: "output vector",
                expected: vec![self.options.num_classes],
                actual: scores_view.shape().to_vec(),
            });
        }
        debug!(len = values.len(), "inference complete");

        Ok(ScoreVector {
            values,
            kind: self.options.score_kind,
        })
    }
}

impl InferenceBackend for OnnxEngine {
    fn name(&self) -> &str {
        "local-onnx"
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Tensor
    }

    fn infer(&self, input: BackendInput<'_>) -> Result<BackendOutput, ClassifierError> {
        match input {
            BackendInput::Tensor(tensor) => self.predict(tensor).map(BackendOutput::Scores),
            BackendInput::Image(_) => Err(ClassifierError::Config(
                "local engine expects a preprocessed tensor".to_string(),
            )),
        }
    }
}

fn build_session(model_path: &Path, options: &EngineOptions) -> Result<Session, OrtError> {
    let level = match options.optimization_level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };
    SessionBuilder::new()?
        .with_optimization_level(level)?
        .with_intra_threads(options.intra_threads.max(1))?
        .commit_from_file(model_path)
}

fn declared_input_shape(input_type: &ValueType) -> Result<[usize; 3], String> {
    let ValueType::Tensor { dimensions, .. } = input_type else {
        return Err(format!("graph input is not a tensor: {input_type:?}"));
    };
    image_input_shape(dimensions)
}

/// (C, H, W) of an (N, C, H, W) graph input; dynamic axes fall back to 3x224x224.
fn image_input_shape(dimensions: &[i64]) -> Result<[usize; 3], String> {
    if dimensions.len() != 4 {
        return Err(format!("expected a batched (N, C, H, W) input, got {dimensions:?}"));
    }
    let mut shape = [INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE];
    for (slot, &dim) in shape.iter_mut().zip(&dimensions[1..]) {
        if dim > 0 {
            *slot = dim as usize;
        }
    }
    Ok(shape)
}

fn check_input_shape(expected: [usize; 3], tensor: &NormalizedTensor) -> Result<(), ClassifierError> {
    let actual = tensor.shape();
    if actual != expected {
        return Err(ClassifierError::ShapeMismatch {
            what: "input tensor",
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}
