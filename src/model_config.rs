use crate::error::ClassifierError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ImageNet per-channel statistics the classifier was trained with, RGB order.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub const INPUT_CHANNELS: usize = 3;
pub const INPUT_SIZE: usize = 224;
pub const NUM_CLASSES: usize = 1000;

/// File name looked up next to the model artifact.
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PreprocessorConfig {
    #[serde(default = "default_mean")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_std")]
    pub image_std: [f32; 3],
    /// Pixel intensities are divided by this before normalization.
    #[serde(default = "default_pixel_scale")]
    pub pixel_scale: f32,
    #[serde(default)]
    pub size: ImageSize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub height: usize,
    pub width: usize,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            height: INPUT_SIZE,
            width: INPUT_SIZE,
        }
    }
}

fn default_mean() -> [f32; 3] {
    IMAGENET_MEAN
}

fn default_std() -> [f32; 3] {
    IMAGENET_STD
}

fn default_pixel_scale() -> f32 {
    255.0
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            image_mean: IMAGENET_MEAN,
            image_std: IMAGENET_STD,
            pixel_scale: default_pixel_scale(),
            size: ImageSize::default(),
        }
    }
}

impl PreprocessorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        let file = std::fs::File::open(path)?;
        let config: PreprocessorConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `preprocessor_config.json` beside the model if one exists.
    pub fn beside_model(model_path: &Path) -> Result<Option<Self>, ClassifierError> {
        let Some(dir) = model_path.parent() else {
            return Ok(None);
        };
        let candidate = dir.join(PREPROCESSOR_CONFIG_FILE);
        if !candidate.exists() {
            return Ok(None);
        }
        Self::from_file(&candidate).map(Some)
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.size.height == 0 || self.size.width == 0 {
            return Err(ClassifierError::Config(format!(
                "target size must be non-zero, got {}x{}",
                self.size.width, self.size.height
            )));
        }
        if self.image_std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ClassifierError::Config(format!(
                "image_std must be positive, got {:?}",
                self.image_std
            )));
        }
        if !self.pixel_scale.is_finite() || self.pixel_scale <= 0.0 {
            return Err(ClassifierError::Config(format!(
                "pixel_scale must be positive, got {}",
                self.pixel_scale
            )));
        }
        Ok(())
    }
}

/// What the artifact's output vector holds. Declared per artifact, never inferred.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Unnormalized scores; softmax is applied before reading confidence.
    #[default]
    Logits,
    /// The graph ends in a softmax already.
    Probabilities,
}
