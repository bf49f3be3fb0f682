//! Checks that an ONNX image classifier gives the same answers locally and
//! behind a remote HTTP deployment.

pub mod backend;
pub mod compare;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod logging;
pub mod model_config;
pub mod monitor;
pub mod onnx_model;
pub mod prediction;
pub mod preprocess;
pub mod remote;
pub mod report;
pub mod service;
pub mod vocabulary;

pub use backend::{BackendInput, BackendOutput, InferenceBackend, InputMode};
pub use error::{ClassifierError, ErrorKind};
pub use fixtures::{Fixture, FixtureSet};
pub use harness::{HarnessOptions, HarnessState, VerificationHarness};
pub use model_config::{PreprocessorConfig, ScoreKind};
pub use onnx_model::{EngineOptions, OnnxEngine};
pub use prediction::{PredictionResult, ScoreVector};
pub use preprocess::{ChannelOrder, ImageInput, NormalizedTensor, Preprocessor, RawImage};
pub use remote::{PayloadMode, RemoteClient, RemoteOptions};
pub use report::VerificationReport;
pub use service::PredictionService;
pub use vocabulary::ClassVocabulary;
